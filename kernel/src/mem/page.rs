//! The supplemental page table: for every page a process may touch, where its
//! contents live right now and how to bring them back.

use crate::{
    fs::FileRef,
    mem::{error::VmError, frame_table::FrameHandle},
    swapping::SwapSlot,
};
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;
use pageros_shared::mem::{is_page_aligned, page_round_down, PAGE_FRAME_SIZE};
use pageros_syscalls::defs::MapId;

/// A page-sized window into a file. Bytes past `valid_bytes` are zero in
/// memory and never written back.
#[derive(Clone)]
pub struct FileSlice {
    pub file: FileRef,
    pub offset: u64,
    pub valid_bytes: usize,
}

impl fmt::Debug for FileSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSlice")
            .field("offset", &self.offset)
            .field("valid_bytes", &self.valid_bytes)
            .finish_non_exhaustive()
    }
}

/// What a page is. Decides where its contents go when it is evicted.
#[derive(Clone, Debug)]
pub enum PageOrigin {
    /// Stack and other zero-initialized pages.
    Anonymous,
    /// Part of a program segment. Modified pages go to swap, never back to the
    /// executable.
    Executable(FileSlice),
    /// Part of a memory-mapped file. Modified pages are written back to it.
    Mapped { id: MapId, slice: FileSlice },
}

/// Where a page's contents are right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageLocation {
    /// Not loaded yet; reads as zeros.
    Zero,
    Swap(SwapSlot),
    /// In the file named by the page's origin.
    File,
    Resident(FrameHandle),
}

#[derive(Clone, Debug)]
pub struct PageDescriptor {
    pub vaddr: usize,
    pub origin: PageOrigin,
    pub location: PageLocation,
    pub writable: bool,
    pub dirty: bool,
}

impl PageDescriptor {
    pub fn zeroed(vaddr: usize, writable: bool) -> Self {
        Self::new(vaddr, PageOrigin::Anonymous, PageLocation::Zero, writable)
    }

    pub fn mapped(vaddr: usize, id: MapId, slice: FileSlice) -> Self {
        Self::new(
            vaddr,
            PageOrigin::Mapped { id, slice },
            PageLocation::File,
            true,
        )
    }

    /// A program segment page. One with no bytes to read is just a zero page
    /// that happens to belong to the segment.
    pub fn executable(vaddr: usize, slice: FileSlice, writable: bool) -> Self {
        let location = if slice.valid_bytes == 0 {
            PageLocation::Zero
        } else {
            PageLocation::File
        };
        Self::new(vaddr, PageOrigin::Executable(slice), location, writable)
    }

    fn new(vaddr: usize, origin: PageOrigin, location: PageLocation, writable: bool) -> Self {
        assert!(is_page_aligned(vaddr), "descriptor for unaligned {vaddr:#X}");
        if let Some(slice) = origin.file_slice() {
            assert!(slice.valid_bytes <= PAGE_FRAME_SIZE);
        }
        Self {
            vaddr,
            origin,
            location,
            writable,
            dirty: false,
        }
    }

    pub fn resident_frame(&self) -> Option<FrameHandle> {
        match self.location {
            PageLocation::Resident(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.resident_frame().is_some()
    }

    pub fn file_slice(&self) -> Option<&FileSlice> {
        self.origin.file_slice()
    }
}

impl PageOrigin {
    pub fn file_slice(&self) -> Option<&FileSlice> {
        match self {
            Self::Anonymous => None,
            Self::Executable(slice) | Self::Mapped { slice, .. } => Some(slice),
        }
    }
}

/// Per-process map from page-aligned virtual address to descriptor. Pure
/// bookkeeping: no I/O and no frames are touched here.
#[derive(Default)]
pub struct SupplementalPageTable {
    pages: HashMap<usize, PageDescriptor>,
}

impl SupplementalPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, vaddr: usize) -> Option<&PageDescriptor> {
        self.pages.get(&page_round_down(vaddr))
    }

    pub fn lookup_mut(&mut self, vaddr: usize) -> Option<&mut PageDescriptor> {
        self.pages.get_mut(&page_round_down(vaddr))
    }

    pub fn insert(&mut self, descriptor: PageDescriptor) -> Result<(), VmError> {
        match self.pages.entry(descriptor.vaddr) {
            hashbrown::hash_map::Entry::Occupied(_) => Err(VmError::AlreadyMapped),
            hashbrown::hash_map::Entry::Vacant(slot) => {
                slot.insert(descriptor);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, vaddr: usize) -> Option<PageDescriptor> {
        self.pages.remove(&page_round_down(vaddr))
    }

    pub fn contains(&self, vaddr: usize) -> bool {
        self.pages.contains_key(&page_round_down(vaddr))
    }

    /// Whether none of the `count` pages starting at `start` has a descriptor.
    pub fn is_range_free(&self, start: usize, count: usize) -> bool {
        (0..count).all(|i| !self.contains(start + i * PAGE_FRAME_SIZE))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.pages.values()
    }

    /// Removes and returns every descriptor.
    pub fn drain(&mut self) -> Vec<PageDescriptor> {
        self.pages.drain().map(|(_, descriptor)| descriptor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::tempfs::TempFile;

    const BASE: usize = 0x1000_0000;

    #[test]
    fn insert_lookup_remove() {
        let mut spt = SupplementalPageTable::new();
        spt.insert(PageDescriptor::zeroed(BASE, true))
            .expect("page is free");
        assert_eq!(
            spt.insert(PageDescriptor::zeroed(BASE, false)).unwrap_err(),
            VmError::AlreadyMapped
        );

        let descriptor = spt.lookup(BASE + 0xfff).expect("page is present");
        assert!(descriptor.writable);
        assert_eq!(descriptor.location, PageLocation::Zero);
        assert!(spt.lookup(BASE + PAGE_FRAME_SIZE).is_none());

        assert!(spt.remove(BASE + 1).is_some());
        assert!(spt.is_empty());
    }

    #[test]
    fn range_checks() {
        let mut spt = SupplementalPageTable::new();
        spt.insert(PageDescriptor::zeroed(BASE + 2 * PAGE_FRAME_SIZE, true))
            .expect("page is free");
        assert!(spt.is_range_free(BASE, 2));
        assert!(!spt.is_range_free(BASE, 3));
        assert_eq!(spt.drain().len(), 1);
        assert_eq!(spt.len(), 0);
    }

    #[test]
    fn empty_segment_page_is_zero() {
        let file = TempFile::with_contents(b"code");
        let slice = FileSlice {
            file,
            offset: 0,
            valid_bytes: 0,
        };
        let descriptor = PageDescriptor::executable(BASE, slice, false);
        assert_eq!(descriptor.location, PageLocation::Zero);
        assert!(descriptor.file_slice().is_some());
        assert!(!descriptor.dirty);
    }

    #[test]
    #[should_panic(expected = "unaligned")]
    fn unaligned_descriptor() {
        PageDescriptor::zeroed(BASE + 8, true);
    }
}
