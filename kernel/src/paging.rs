//! Per-process page tables, walked in software.
//!
//! Entries use the x86 layout from [`pageros_shared::paging`], so the
//! accessed and dirty bits mean what the hardware would make them mean:
//! [`AddressSpace::access`] sets them the way the MMU does on each load or
//! store, and eviction reads them back.

use crate::mem::frame_allocator::FrameNumber;
use alloc::{boxed::Box, vec::Vec};
use pageros_shared::{
    mem::{is_user_address, page_round_down},
    paging::{PageTable, PageTableEntry, VirtualAddress, PAGE_DIRECTORY_LEN},
};

/// Why a user access could not be satisfied by the page tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessFault {
    NotPresent,
    ReadOnly,
}

pub struct AddressSpace {
    directory: Vec<Option<Box<PageTable>>>,
    mapped: usize,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        let mut directory = Vec::with_capacity(PAGE_DIRECTORY_LEN);
        directory.resize_with(PAGE_DIRECTORY_LEN, || None);
        Self {
            directory,
            mapped: 0,
        }
    }

    fn entry(&self, vaddr: usize) -> Option<&PageTableEntry> {
        let addr = VirtualAddress::from_usize(vaddr);
        let table = self.directory[addr.directory_slot()].as_ref()?;
        Some(&table[addr.table_slot()]).filter(|entry| entry.present())
    }

    fn entry_mut(&mut self, vaddr: usize) -> Option<&mut PageTableEntry> {
        let addr = VirtualAddress::from_usize(vaddr);
        let table = self.directory[addr.directory_slot()].as_mut()?;
        Some(&mut table[addr.table_slot()]).filter(|entry| entry.present())
    }

    /// Maps the page containing `vaddr` to `frame`. Returns false, leaving the
    /// tables alone, if the page is already mapped or is not a user page.
    pub fn map(&mut self, vaddr: usize, frame: FrameNumber, writable: bool) -> bool {
        if !is_user_address(vaddr) || self.entry(vaddr).is_some() {
            return false;
        }
        let addr = VirtualAddress::from_usize(page_round_down(vaddr));
        let table = self.directory[addr.directory_slot()].get_or_insert_with(Box::default);
        table[addr.table_slot()] = PageTableEntry::user(frame.as_u32(), writable);
        self.mapped += 1;
        true
    }

    /// Removes the mapping for the page containing `vaddr`, returning the entry
    /// as it was so the caller can inspect its dirty bit.
    pub fn unmap(&mut self, vaddr: usize) -> Option<PageTableEntry> {
        if !is_user_address(vaddr) {
            return None;
        }
        let addr = VirtualAddress::from_usize(vaddr);
        let slot = addr.directory_slot();
        let table = self.directory[slot].as_mut()?;
        let entry = table[addr.table_slot()];
        if !entry.present() {
            return None;
        }
        table[addr.table_slot()] = PageTableEntry::DEFAULT;
        if table.is_empty() {
            self.directory[slot] = None;
        }
        self.mapped -= 1;
        Some(entry)
    }

    pub fn translate(&self, vaddr: usize) -> Option<FrameNumber> {
        if !is_user_address(vaddr) {
            return None;
        }
        self.entry(vaddr).map(|entry| FrameNumber::new(entry.frame()))
    }

    pub fn is_dirty(&self, vaddr: usize) -> bool {
        is_user_address(vaddr) && self.entry(vaddr).is_some_and(|entry| entry.dirty())
    }

    /// Reads and clears the accessed bit.
    pub fn take_accessed(&mut self, vaddr: usize) -> bool {
        if !is_user_address(vaddr) {
            return false;
        }
        match self.entry_mut(vaddr) {
            Some(entry) => {
                let accessed = entry.accessed();
                *entry = entry.with_accessed(false);
                accessed
            }
            None => false,
        }
    }

    /// Performs the MMU's part of a user load or store: checks the entry and
    /// sets its accessed bit, and its dirty bit on a store.
    pub fn access(&mut self, vaddr: usize, write: bool) -> Result<FrameNumber, AccessFault> {
        if !is_user_address(vaddr) {
            return Err(AccessFault::NotPresent);
        }
        let entry = self.entry_mut(vaddr).ok_or(AccessFault::NotPresent)?;
        if write && !entry.read_write() {
            return Err(AccessFault::ReadOnly);
        }
        *entry = entry.with_accessed(true).with_dirty(entry.dirty() || write);
        Ok(FrameNumber::new(entry.frame()))
    }

    /// Number of pages currently mapped.
    pub fn mapped_pages(&self) -> usize {
        self.mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageros_shared::mem::{OFFSET, PAGE_FRAME_SIZE};

    const PAGE: usize = 0x0804_8000;

    #[test]
    fn map_translate_unmap() {
        let mut space = AddressSpace::new();
        assert!(space.map(PAGE, FrameNumber::new(7), true));
        assert!(!space.map(PAGE + 12, FrameNumber::new(8), true));
        assert_eq!(space.translate(PAGE + 100), Some(FrameNumber::new(7)));
        assert_eq!(space.mapped_pages(), 1);

        let entry = space.unmap(PAGE).expect("page was mapped");
        assert_eq!(entry.frame(), 7);
        assert_eq!(space.translate(PAGE), None);
        assert!(space.unmap(PAGE).is_none());
        assert_eq!(space.mapped_pages(), 0);
    }

    #[test]
    fn kernel_addresses_are_never_mapped() {
        let mut space = AddressSpace::new();
        assert!(!space.map(OFFSET, FrameNumber::new(1), true));
        assert_eq!(space.access(OFFSET + 4, false), Err(AccessFault::NotPresent));
    }

    #[test]
    fn access_tracks_accessed_and_dirty() {
        let mut space = AddressSpace::new();
        space.map(PAGE, FrameNumber::new(3), true);
        assert!(!space.take_accessed(PAGE));

        assert_eq!(space.access(PAGE, false), Ok(FrameNumber::new(3)));
        assert!(!space.is_dirty(PAGE));
        assert!(space.take_accessed(PAGE));
        assert!(!space.take_accessed(PAGE));

        space.access(PAGE + 1, true).expect("page is writable");
        assert!(space.is_dirty(PAGE));
        assert!(space.unmap(PAGE).is_some_and(|entry| entry.dirty()));
    }

    #[test]
    fn read_only_store_faults() {
        let mut space = AddressSpace::new();
        space.map(PAGE, FrameNumber::new(3), false);
        assert_eq!(space.access(PAGE, true), Err(AccessFault::ReadOnly));
        assert_eq!(space.access(PAGE + PAGE_FRAME_SIZE, false), Err(AccessFault::NotPresent));
        assert!(!space.is_dirty(PAGE));
    }
}
