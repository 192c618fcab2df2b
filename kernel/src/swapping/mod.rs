//! Eviction: taking a frame away from the page that holds it.

pub mod page_replacement;
pub mod swapping_utils;

pub use swapping_utils::{SwapSlot, SwapSpace};

use crate::{
    mem::{
        error::VmError,
        frame_allocator::FrameNumber,
        frame_table::{FrameEntry, FrameHandle},
        page::{FileSlice, PageDescriptor, PageLocation, PageOrigin, SupplementalPageTable},
    },
    sync::mutex::relax,
    system::VmSystem,
    threading::process::{Pid, Process},
};
use alloc::sync::Arc;
use pageros_shared::mem::page_round_down;

impl VmSystem {
    /// Evicts one page and returns its frame to the pool.
    pub fn evict_one(&self) -> Result<FrameNumber, VmError> {
        let frame = self.evict_frame()?;
        self.frames.dealloc(frame);
        Ok(frame)
    }

    /// Evicts one page and hands its frame, still allocated, to the caller, so
    /// that no other faulter can take it in between.
    ///
    /// Fails with `OutOfMemory` only when no frame is bound and none is being
    /// filled. If every candidate is busy the sweep is retried: owners hold
    /// their SPT lock only briefly, and frames being filled are bound soon.
    pub(crate) fn evict_frame(&self) -> Result<FrameNumber, VmError> {
        loop {
            let mut table = self.frame_table.lock();
            let candidates = self.policy.lock().candidates(&table);
            if candidates.is_empty() && self.frames.allocated() <= table.len() {
                return Err(VmError::OutOfMemory);
            }
            for handle in candidates {
                let Some(entry) = table.get(handle) else {
                    continue;
                };
                let owner = Arc::clone(&entry.owner);
                // The frame table lock is held, so the SPT may only be
                // try-locked.
                let Some(mut pages) = owner.pages.try_lock() else {
                    continue;
                };
                let entry = table.unbind(handle);
                drop(table);
                return self.write_back(&owner, &mut pages, handle, entry);
            }
            drop(table);
            log::trace!("no evictable frame right now, retrying");
            relax();
        }
    }

    /// Moves an unbound page out of its frame, wherever its origin says it
    /// should go. If no swap slot is left the page is reinstalled unchanged.
    fn write_back(
        &self,
        owner: &Arc<Process>,
        pages: &mut SupplementalPageTable,
        handle: FrameHandle,
        entry: FrameEntry,
    ) -> Result<FrameNumber, VmError> {
        let FrameEntry { frame, vaddr, .. } = entry;
        let mapping = owner.space.lock().unmap(vaddr);
        let Some(descriptor) = pages.lookup_mut(vaddr) else {
            panic!("{frame} bound to {vaddr:#X} of pid {} without a descriptor", owner.pid);
        };
        assert_eq!(
            descriptor.location,
            PageLocation::Resident(handle),
            "frame table and page table disagree about {vaddr:#X}"
        );
        let dirty = descriptor.dirty || mapping.is_some_and(|entry| entry.dirty());
        log::debug!(
            "evicting {vaddr:#X} of pid {} from {frame}{}",
            owner.pid,
            if dirty { " (dirty)" } else { "" }
        );

        descriptor.location = match (&descriptor.origin, dirty) {
            (PageOrigin::Mapped { slice, .. }, true) => {
                self.write_to_file(slice, frame);
                PageLocation::File
            }
            (PageOrigin::Mapped { .. } | PageOrigin::Executable(_), false) => PageLocation::File,
            (PageOrigin::Anonymous, false) => PageLocation::Zero,
            (PageOrigin::Anonymous | PageOrigin::Executable(_), true) => {
                match self.swap.allocate_slot() {
                    Ok(slot) => {
                        self.write_to_swap(slot, frame);
                        PageLocation::Swap(slot)
                    }
                    Err(err) => {
                        log::warn!("no swap slot for {vaddr:#X} of pid {}", owner.pid);
                        let handle = self.frame_table.bind(frame, Arc::clone(owner), vaddr);
                        owner.space.lock().map(vaddr, frame, descriptor.writable);
                        descriptor.location = PageLocation::Resident(handle);
                        descriptor.dirty = true;
                        return Err(err);
                    }
                }
            }
        };
        descriptor.dirty = false;
        Ok(frame)
    }

    fn write_to_swap(&self, slot: SwapSlot, frame: FrameNumber) {
        let data = self.frames.frame(frame);
        if let Err(err) = self.swap.write_page(slot, &data) {
            log::error!("writing {frame} to {slot}: {err}");
            panic!("swap write failed: {err}");
        }
    }

    /// Writes the valid part of a mapped page back to its file. Losing the
    /// data is not an option, so failure halts the kernel.
    pub(crate) fn write_to_file(&self, slice: &FileSlice, frame: FrameNumber) {
        let data = self.frames.frame(frame);
        match slice.file.write_at(&data[..slice.valid_bytes], slice.offset) {
            Ok(written) if written == slice.valid_bytes => {}
            Ok(written) => {
                log::error!(
                    "short write of {frame} at offset {}: {written} of {} bytes",
                    slice.offset,
                    slice.valid_bytes
                );
                panic!("mapped file write-back was short");
            }
            Err(err) => {
                log::error!("writing {frame} back at offset {}: {err}", slice.offset);
                panic!("mapped file write-back failed: {err}");
            }
        }
    }

    /// Releases the frame behind a resident page, writing the page back
    /// wherever eviction would put it. The descriptor stays, so the next access
    /// faults the page back in. Returns false if the page is not resident, or
    /// if it is dirty and no swap slot is left for it.
    pub fn free_frame(&self, pid: Pid, vaddr: usize) -> bool {
        let Some(process) = self.process(pid) else {
            return false;
        };
        let page = page_round_down(vaddr);
        let _serial = process.fault_lock.lock();
        let mut pages = process.pages.lock();
        let Some(handle) = pages.lookup(page).and_then(PageDescriptor::resident_frame) else {
            return false;
        };
        let entry = self.frame_table.unbind(handle);
        match self.write_back(&process, &mut pages, handle, entry) {
            Ok(frame) => {
                self.frames.dealloc(frame);
                true
            }
            Err(err) => {
                log::warn!("pid {pid}: keeping {page:#X} resident: {err}");
                false
            }
        }
    }

    /// Unbinds and unmaps a resident page and frees its frame, first writing a
    /// dirty mapped page back to its file if `write_back` is set. The caller
    /// holds the owner's SPT lock and has taken the descriptor out of it.
    pub(crate) fn release_frame(
        &self,
        process: &Process,
        descriptor: &PageDescriptor,
        write_back: bool,
    ) {
        let Some(handle) = descriptor.resident_frame() else {
            return;
        };
        let entry = self.frame_table.unbind(handle);
        debug_assert_eq!(entry.vaddr, descriptor.vaddr);
        let mapping = process.space.lock().unmap(descriptor.vaddr);
        let dirty = descriptor.dirty || mapping.is_some_and(|entry| entry.dirty());
        if let (true, true, PageOrigin::Mapped { slice, .. }) =
            (write_back, dirty, &descriptor.origin)
        {
            self.write_to_file(slice, entry.frame);
        }
        self.frames.dealloc(entry.frame);
    }
}
