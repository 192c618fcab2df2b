use crate::{
    block::{BlockDevice, BlockError, BlockSector, BLOCK_SECTOR_SIZE},
    mem::error::VmError,
    sync::Mutex,
};
use alloc::boxed::Box;
use core::fmt;
use pageros_shared::{bitmap::Bitmap, mem::PAGE_FRAME_SIZE};

const SECTORS_IN_PAGE: usize = PAGE_FRAME_SIZE / BLOCK_SECTOR_SIZE;

/// A page-sized region of the swap device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(u32);

impl SwapSlot {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn first_sector(self) -> BlockSector {
        // Fits: slot indices are bounded by the device size in sectors.
        #[allow(clippy::cast_possible_truncation)]
        let sectors = SECTORS_IN_PAGE as BlockSector;
        self.0 * sectors
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swap slot {}", self.0)
    }
}

/// Slot allocator over a block device. Knows nothing about pages beyond their
/// size; callers decide what goes in a slot and when it is released.
pub struct SwapSpace {
    device: Box<dyn BlockDevice>,
    /// One bit per slot. Never held across device I/O.
    bitmap: Mutex<Bitmap>,
}

impl SwapSpace {
    /// Uses the whole of `device`. A trailing partial page is ignored.
    pub fn new(device: Box<dyn BlockDevice>) -> Self {
        let slots = device.size() as usize / SECTORS_IN_PAGE;
        log::debug!("swap on \"{}\": {slots} slots", device.name());
        Self {
            device,
            bitmap: Mutex::new(Bitmap::new(slots)),
        }
    }

    pub fn allocate_slot(&self) -> Result<SwapSlot, VmError> {
        let index = self
            .bitmap
            .lock()
            .scan_and_flip(0, 1, false)
            .ok_or(VmError::SwapExhausted)?;
        // Fits: the bitmap has at most `BlockSector::MAX` bits.
        #[allow(clippy::cast_possible_truncation)]
        let slot = SwapSlot(index as u32);
        Ok(slot)
    }

    pub fn free_slot(&self, slot: SwapSlot) {
        let mut bitmap = self.bitmap.lock();
        assert!(bitmap.get(slot.index()), "freeing unused {slot}");
        bitmap.set(slot.index(), false);
    }

    /// Writes one page to an allocated slot.
    pub fn write_page(&self, slot: SwapSlot, page: &[u8]) -> Result<(), BlockError> {
        assert_eq!(page.len(), PAGE_FRAME_SIZE);
        assert!(self.is_allocated(slot), "writing unallocated {slot}");
        for (sector, chunk) in (slot.first_sector()..).zip(page.chunks_exact(BLOCK_SECTOR_SIZE)) {
            self.device.write(sector, chunk)?;
        }
        Ok(())
    }

    /// Reads one page back and frees its slot. The slot stays allocated if the
    /// read fails.
    pub fn read_page(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), BlockError> {
        assert_eq!(page.len(), PAGE_FRAME_SIZE);
        assert!(self.is_allocated(slot), "reading unallocated {slot}");
        for (sector, chunk) in (slot.first_sector()..).zip(page.chunks_exact_mut(BLOCK_SECTOR_SIZE)) {
            self.device.read(sector, chunk)?;
        }
        self.free_slot(slot);
        Ok(())
    }

    pub fn is_allocated(&self, slot: SwapSlot) -> bool {
        let bitmap = self.bitmap.lock();
        slot.index() < bitmap.len() && bitmap.get(slot.index())
    }

    pub fn capacity(&self) -> usize {
        self.bitmap.lock().len()
    }

    pub fn slots_in_use(&self) -> usize {
        self.bitmap.lock().count(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemBlock;

    fn swap(slots: u32) -> SwapSpace {
        SwapSpace::new(Box::new(MemBlock::new("swap", slots * 8)))
    }

    #[test]
    fn allocations_set_exactly_that_many_bits() {
        let swap = swap(16);
        assert_eq!(swap.capacity(), 16);
        let slots: Vec<_> = (0..10)
            .map(|_| swap.allocate_slot().expect("slot available"))
            .collect();
        assert_eq!(swap.slots_in_use(), 10);

        for slot in &slots[..5] {
            swap.free_slot(*slot);
        }
        assert_eq!(swap.slots_in_use(), 5);

        // Only the freed half comes back before the untouched tail.
        for _ in 0..5 {
            let slot = swap.allocate_slot().expect("slot available");
            assert!(slot.index() < 5);
        }
        assert_eq!(swap.allocate_slot().expect("slot available").index(), 10);
    }

    #[test]
    fn exhaustion() {
        let swap = swap(2);
        swap.allocate_slot().expect("slot available");
        swap.allocate_slot().expect("slot available");
        assert_eq!(swap.allocate_slot(), Err(VmError::SwapExhausted));
    }

    #[test]
    fn page_round_trip_frees_slot() {
        let swap = swap(4);
        let slot = swap.allocate_slot().expect("slot available");
        let page: Vec<u8> = (0..PAGE_FRAME_SIZE).map(|i| (i % 251) as u8).collect();
        swap.write_page(slot, &page).expect("write failed");

        let mut back = vec![0u8; PAGE_FRAME_SIZE];
        swap.read_page(slot, &mut back).expect("read failed");
        assert_eq!(back, page);
        assert!(!swap.is_allocated(slot));
        assert_eq!(swap.slots_in_use(), 0);
    }

    #[test]
    fn partial_trailing_page_is_unused() {
        let swap = SwapSpace::new(Box::new(MemBlock::new("swap", 20)));
        assert_eq!(swap.capacity(), 2);
    }

    #[test]
    #[should_panic(expected = "freeing unused")]
    fn double_free() {
        let swap = swap(1);
        let slot = swap.allocate_slot().expect("slot available");
        swap.free_slot(slot);
        swap.free_slot(slot);
    }
}
