// https://wiki.osdev.org/Paging

// Avoids lots of warnings about casting usize to u32 which cannot result in
// truncation for user addresses, which always fit in 32 bits.
#![allow(clippy::cast_possible_truncation)]

use crate::mem::PAGE_FRAME_SIZE;
use arbitrary_int::{u10, u12, u20};
use bitbybit::bitfield;
use core::{
    mem::size_of,
    ops::{Deref, DerefMut},
};

pub const PAGE_TABLE_LEN: usize = PAGE_FRAME_SIZE / size_of::<PageTableEntry>();
pub const PAGE_DIRECTORY_LEN: usize = PAGE_TABLE_LEN;

#[repr(align(4096))]
pub struct PageTable(pub [PageTableEntry; PAGE_TABLE_LEN]);

impl PageTable {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|entry| !entry.present())
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self([PageTableEntry::DEFAULT; PAGE_TABLE_LEN])
    }
}

impl Deref for PageTable {
    type Target = [PageTableEntry; PAGE_TABLE_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PageTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[bitfield(u32, default = 0)]
pub struct PageTableEntry {
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    read_write: bool,
    #[bit(2, rw)]
    user_supervisor: bool,
    #[bit(5, rw)]
    accessed: bool,
    #[bit(6, rw)]
    dirty: bool,
    #[bits(12..=31, rw)]
    page_frame_address: u20,
}

impl PageTableEntry {
    /// A present user entry pointing at `frame`.
    pub fn user(frame: u32, writable: bool) -> Self {
        Self::DEFAULT
            .with_present(true)
            .with_user_supervisor(true)
            .with_read_write(writable)
            .with_page_frame_address(u20::new(frame))
    }

    pub fn frame(&self) -> u32 {
        self.page_frame_address().value()
    }
}

#[bitfield(u32)]
pub struct VirtualAddress {
    #[bits(22..=31, r)]
    page_directory_index: u10,
    #[bits(12..=21, r)]
    page_table_index: u10,
    #[bits(0..=11, r)]
    offset: u12,
}

impl VirtualAddress {
    pub fn from_usize(addr: usize) -> Self {
        Self::new_with_raw_value(addr as u32)
    }

    pub fn directory_slot(&self) -> usize {
        usize::from(self.page_directory_index().value())
    }

    pub fn table_slot(&self) -> usize {
        usize::from(self.page_table_index().value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_address_split() {
        let addr = VirtualAddress::from_usize(0x0804_8123);
        assert_eq!(addr.directory_slot(), 0x20);
        assert_eq!(addr.table_slot(), 0x48);
        assert_eq!(addr.offset().value(), 0x123);
    }

    #[test]
    fn user_entry() {
        let entry = PageTableEntry::user(0x42, false);
        assert!(entry.present());
        assert!(entry.user_supervisor());
        assert!(!entry.read_write());
        assert!(!entry.dirty());
        assert_eq!(entry.frame(), 0x42);
    }
}
