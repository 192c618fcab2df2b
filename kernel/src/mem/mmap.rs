use crate::{
    fs::{Fd, FileRef},
    mem::{
        error::VmError,
        page::{FileSlice, PageDescriptor},
    },
    system::VmSystem,
    threading::process::{Pid, Process},
};
use alloc::{collections::BTreeMap, vec::Vec};
use core::cmp::min;
use pageros_shared::mem::{is_page_aligned, pages_for, PAGE_FRAME_SIZE};
use pageros_syscalls::defs::{MapId, STDIN_FILENO, STDOUT_FILENO};

/// A file mapped into a contiguous run of pages.
#[derive(Clone)]
pub struct Mapping {
    pub id: MapId,
    pub base: usize,
    pub pages: usize,
    pub file: FileRef,
}

#[derive(Default)]
pub struct MappingTable {
    mappings: BTreeMap<MapId, Mapping>,
    next_id: MapId,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, base: usize, pages: usize, file: FileRef) -> MapId {
        let id = self.next_id;
        self.next_id += 1;
        self.mappings.insert(
            id,
            Mapping {
                id,
                base,
                pages,
                file,
            },
        );
        id
    }

    pub fn get(&self, id: MapId) -> Option<&Mapping> {
        self.mappings.get(&id)
    }

    pub fn remove(&mut self, id: MapId) -> Option<Mapping> {
        self.mappings.remove(&id)
    }

    pub fn drain(&mut self) -> Vec<Mapping> {
        core::mem::take(&mut self.mappings).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl VmSystem {
    /// Maps the whole of the file open as `fd` at `base`. Pages are loaded
    /// lazily; the last one is zero-padded past the end of the file.
    pub fn create_mapping(&self, pid: Pid, fd: Fd, base: usize) -> Result<MapId, VmError> {
        if fd == STDIN_FILENO || fd == STDOUT_FILENO {
            return Err(VmError::BadFileDescriptor);
        }
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;
        let file = process
            .files
            .lock()
            .get(fd)
            .ok_or(VmError::BadFileDescriptor)?;
        let length = usize::try_from(file.length()).map_err(|_| VmError::InvalidAddress)?;
        if length == 0 {
            return Err(VmError::EmptyFile);
        }
        if base == 0 || !is_page_aligned(base) {
            return Err(VmError::InvalidAddress);
        }
        let pages = pages_for(length);
        let end = pages
            .checked_mul(PAGE_FRAME_SIZE)
            .and_then(|size| base.checked_add(size))
            .ok_or(VmError::InvalidAddress)?;
        if end > self.stack_floor() {
            return Err(VmError::InvalidAddress);
        }

        // Survives the process closing `fd`.
        let file = file.reopen()?;

        let _serial = process.fault_lock.lock();
        let mut spt = process.pages.lock();
        if !spt.is_range_free(base, pages) {
            return Err(VmError::AlreadyMapped);
        }
        let id = process
            .mappings
            .lock()
            .insert(base, pages, file.clone());
        for i in 0..pages {
            let offset = i * PAGE_FRAME_SIZE;
            let slice = FileSlice {
                file: file.clone(),
                offset: offset as u64,
                valid_bytes: min(PAGE_FRAME_SIZE, length - offset),
            };
            spt.insert(PageDescriptor::mapped(base + offset, id, slice))?;
        }

        log::debug!("pid {pid}: mapped fd {fd} at {base:#X} ({pages} pages) as {id}");
        Ok(id)
    }

    /// Unmaps a mapping, writing its dirty pages back to the file.
    pub fn destroy_mapping(&self, pid: Pid, id: MapId) -> Result<(), VmError> {
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;
        let _serial = process.fault_lock.lock();
        let mapping = process
            .mappings
            .lock()
            .remove(id)
            .ok_or(VmError::NoSuchMapping)?;
        self.unmap_region(&process, &mapping);
        log::debug!("pid {pid}: unmapped {id}");
        Ok(())
    }

    /// Caller holds the process's fault lock.
    pub(crate) fn unmap_region(&self, process: &Process, mapping: &Mapping) {
        let mut pages = process.pages.lock();
        for i in 0..mapping.pages {
            if let Some(descriptor) = pages.remove(mapping.base + i * PAGE_FRAME_SIZE) {
                self.release_frame(process, &descriptor, true);
            }
        }
    }

    /// Registers a program segment for lazy loading: `read_bytes` bytes from
    /// `file` at `offset` followed by `zero_bytes` zeros, starting at `upage`.
    /// Modified pages are swapped, never written back to the file.
    #[allow(clippy::too_many_arguments)]
    pub fn load_segment(
        &self,
        pid: Pid,
        file: &FileRef,
        offset: u64,
        upage: usize,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), VmError> {
        let total = read_bytes
            .checked_add(zero_bytes)
            .ok_or(VmError::InvalidAddress)?;
        if upage == 0 || !is_page_aligned(upage) || total % PAGE_FRAME_SIZE != 0 {
            return Err(VmError::InvalidAddress);
        }
        let pages = total / PAGE_FRAME_SIZE;
        let end = upage.checked_add(total).ok_or(VmError::InvalidAddress)?;
        if end > self.stack_floor() {
            return Err(VmError::InvalidAddress);
        }
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;

        let _serial = process.fault_lock.lock();
        let mut spt = process.pages.lock();
        if !spt.is_range_free(upage, pages) {
            return Err(VmError::AlreadyMapped);
        }
        let mut remaining = read_bytes;
        for i in 0..pages {
            let page_read = min(remaining, PAGE_FRAME_SIZE);
            let slice = FileSlice {
                file: file.clone(),
                offset: offset + (i * PAGE_FRAME_SIZE) as u64,
                valid_bytes: page_read,
            };
            spt.insert(PageDescriptor::executable(
                upage + i * PAGE_FRAME_SIZE,
                slice,
                writable,
            ))?;
            remaining -= page_read;
        }
        Ok(())
    }
}
