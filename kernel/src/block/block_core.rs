use crate::{block::block_error::BlockError, sync::Mutex};
use alloc::{string::String, vec, vec::Vec};
use core::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use pageros_shared::sizes::SECTOR_SIZE;

/// Size of a block device sector in bytes.
pub const BLOCK_SECTOR_SIZE: usize = SECTOR_SIZE;

/// Index of a block device sector.
pub type BlockSector = u32;

/// Sector-addressed storage. Swap space is carved out of one of these.
pub trait BlockDevice: Send + Sync {
    fn name(&self) -> &str;

    /// Size of the device in sectors.
    fn size(&self) -> BlockSector;

    /// Reads sector `sector` into `buf`, which must be `BLOCK_SECTOR_SIZE`
    /// bytes long.
    fn read(&self, sector: BlockSector, buf: &mut [u8]) -> Result<(), BlockError>;

    /// Writes `buf`, which must be `BLOCK_SECTOR_SIZE` bytes long, to sector
    /// `sector`. Returns once the device has the data.
    fn write(&self, sector: BlockSector, buf: &[u8]) -> Result<(), BlockError>;
}

/// A block device backed by RAM.
pub struct MemBlock {
    name: String,
    size: BlockSector,
    data: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
    read_count: AtomicU32,
    write_count: AtomicU32,
}

impl MemBlock {
    pub fn new(name: &str, size: BlockSector) -> Self {
        Self {
            name: String::from(name),
            size,
            data: Mutex::new(vec![0; size as usize * BLOCK_SECTOR_SIZE]),
            fail_writes: AtomicBool::new(false),
            read_count: AtomicU32::new(0),
            write_count: AtomicU32::new(0),
        }
    }

    /// Makes every subsequent write fail with [`BlockError::WriteError`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u32 {
        self.write_count.load(Ordering::Relaxed)
    }

    fn check(&self, sector: BlockSector, len: usize) -> Result<usize, BlockError> {
        if sector >= self.size {
            return Err(BlockError::SectorOutOfBounds);
        }
        if len != BLOCK_SECTOR_SIZE {
            return Err(BlockError::BufferInvalid);
        }
        Ok(sector as usize * BLOCK_SECTOR_SIZE)
    }
}

impl BlockDevice for MemBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> BlockSector {
        self.size
    }

    fn read(&self, sector: BlockSector, buf: &mut [u8]) -> Result<(), BlockError> {
        let start = self.check(sector, buf.len())?;
        buf.copy_from_slice(&self.data.lock()[start..start + BLOCK_SECTOR_SIZE]);
        self.read_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write(&self, sector: BlockSector, buf: &[u8]) -> Result<(), BlockError> {
        let start = self.check(sector, buf.len())?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(BlockError::WriteError);
        }
        self.data.lock()[start..start + BLOCK_SECTOR_SIZE].copy_from_slice(buf);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl fmt::Display for MemBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "\"{}\": {:04} sectors, {:04} read, {:04} write",
            self.name,
            self.size,
            self.read_count(),
            self.write_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_round_trip() {
        let block = MemBlock::new("swap", 4);
        let data = [0xabu8; BLOCK_SECTOR_SIZE];
        block.write(3, &data).expect("write failed");

        let mut buf = [0u8; BLOCK_SECTOR_SIZE];
        block.read(3, &mut buf).expect("read failed");
        assert_eq!(buf, data);

        block.read(2, &mut buf).expect("read failed");
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!((block.read_count(), block.write_count()), (2, 1));
    }

    #[test]
    fn rejects_bad_requests() {
        let block = MemBlock::new("swap", 4);
        let mut buf = [0u8; BLOCK_SECTOR_SIZE];
        assert_eq!(block.read(4, &mut buf), Err(BlockError::SectorOutOfBounds));
        assert_eq!(block.write(0, &buf[..10]), Err(BlockError::BufferInvalid));

        block.set_fail_writes(true);
        assert_eq!(block.write(0, &buf), Err(BlockError::WriteError));
        assert_eq!(block.write_count(), 0);
    }
}
