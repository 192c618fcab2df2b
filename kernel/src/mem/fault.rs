//! Page fault resolution.
//!
//! A fault moves through three steps: find the page's descriptor (or grow
//! the stack to create one), get a frame and fill it from wherever the page
//! lives, then install it. Faults of one process are serialized by its fault
//! lock; the SPT lock is dropped while the frame is filled so that eviction
//! can make progress against this process.

use crate::{
    config::ExhaustionPolicy,
    mem::{
        error::VmError,
        frame_allocator::FrameNumber,
        page::{PageDescriptor, PageLocation},
    },
    system::VmSystem,
    threading::process::{Pid, Process},
};
use alloc::sync::Arc;
use pageros_shared::mem::{is_user_address, page_round_down, OFFSET};

/// What the trap path knows about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultFlags {
    /// The page was mapped; this is a protection fault.
    pub present: bool,
    pub write: bool,
    /// The fault was raised while running user code.
    pub user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    KernelAddress,
    /// No descriptor and not a plausible stack access.
    Unmapped,
    /// Write to a read-only page.
    ReadOnly,
    /// Protection fault on a resident page that no write explains.
    Protection,
    NoSuchProcess,
    /// No frame or swap slot could be found.
    Exhausted(VmError),
}

impl From<RejectReason> for VmError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::KernelAddress => Self::InvalidAddress,
            RejectReason::Unmapped => Self::NotMapped,
            RejectReason::ReadOnly | RejectReason::Protection => Self::ProtectionViolation,
            RejectReason::NoSuchProcess => Self::NoSuchProcess,
            RejectReason::Exhausted(err) => err,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Retry the access.
    Resolved,
    /// The process has been terminated.
    Rejected(RejectReason),
}

impl VmSystem {
    /// Entry point from the trap path.
    pub fn on_page_fault(&self, pid: Pid, vaddr: usize, flags: FaultFlags) -> FaultOutcome {
        let Some(process) = self.process(pid) else {
            return FaultOutcome::Rejected(RejectReason::NoSuchProcess);
        };
        if !is_user_address(vaddr) {
            assert!(
                flags.user,
                "kernel page fault at {vaddr:#X} (present: {}, write: {})",
                flags.present, flags.write
            );
            return self.reject(&process, vaddr, RejectReason::KernelAddress);
        }

        match self.resolve_fault(&process, vaddr, flags) {
            Ok(FaultOutcome::Rejected(reason)) => self.reject(&process, vaddr, reason),
            Ok(FaultOutcome::Resolved) => FaultOutcome::Resolved,
            Err(err) => match self.config.exhaustion {
                ExhaustionPolicy::Halt => {
                    log::error!("fault at {vaddr:#X} of pid {pid}: {err}");
                    panic!("unable to resolve page fault: {err}");
                }
                ExhaustionPolicy::TerminateProcess => {
                    self.reject(&process, vaddr, RejectReason::Exhausted(err))
                }
            },
        }
    }

    fn reject(&self, process: &Process, vaddr: usize, reason: RejectReason) -> FaultOutcome {
        log::warn!(
            "pid {} ({}): rejected fault at {vaddr:#X}: {reason:?}",
            process.pid,
            process.name
        );
        // Someone else may have terminated it already.
        let _ = self.exit_process(process.pid, -1);
        FaultOutcome::Rejected(reason)
    }

    pub(crate) fn resolve_fault(
        &self,
        process: &Arc<Process>,
        vaddr: usize,
        flags: FaultFlags,
    ) -> Result<FaultOutcome, VmError> {
        let page = page_round_down(vaddr);
        if page == 0 {
            return Ok(FaultOutcome::Rejected(RejectReason::Unmapped));
        }
        let _serial = process.fault_lock.lock();

        loop {
            let snapshot = {
                let mut pages = process.pages.lock();
                match pages.lookup_mut(page) {
                    Some(descriptor) if descriptor.is_resident() => {
                        return Ok(resident_fault(process, descriptor, flags));
                    }
                    Some(descriptor) => descriptor.clone(),
                    None if self.is_stack_access(process, vaddr) => {
                        log::debug!("pid {}: growing stack to {page:#X}", process.pid);
                        let descriptor = PageDescriptor::zeroed(page, true);
                        pages.insert(descriptor.clone())?;
                        descriptor
                    }
                    None => return Ok(FaultOutcome::Rejected(RejectReason::Unmapped)),
                }
            };
            if flags.write && !snapshot.writable {
                return Ok(FaultOutcome::Rejected(RejectReason::ReadOnly));
            }

            let frame = self.obtain_frame()?;
            let loaded_dirty = match self.populate(frame, &snapshot) {
                Ok(dirty) => dirty,
                Err(err) => {
                    self.frames.dealloc(frame);
                    return Err(err);
                }
            };

            let mut pages = process.pages.lock();
            let Some(descriptor) = pages
                .lookup_mut(page)
                .filter(|current| current.location == snapshot.location)
            else {
                log::debug!("pid {}: {page:#X} changed while loading", process.pid);
                drop(pages);
                self.frames.dealloc(frame);
                continue;
            };

            let handle = self.frame_table.bind(frame, Arc::clone(process), page);
            let installed = process.space.lock().map(page, frame, descriptor.writable);
            assert!(installed, "{page:#X} of pid {} mapped twice", process.pid);
            descriptor.location = PageLocation::Resident(handle);
            descriptor.dirty = loaded_dirty || flags.write;
            return Ok(FaultOutcome::Resolved);
        }
    }

    /// Whether an access to an unmapped `vaddr` should grow the stack: it must
    /// fall inside the stack reserve and at most `stack_growth_window` bytes
    /// below the stack pointer.
    fn is_stack_access(&self, process: &Process, vaddr: usize) -> bool {
        (self.stack_floor()..OFFSET).contains(&vaddr)
            && vaddr.saturating_add(self.config.stack_growth_window) >= process.stack_pointer()
    }

    /// A free frame, or else one taken from an evicted page.
    fn obtain_frame(&self) -> Result<FrameNumber, VmError> {
        if let Some(frame) = self.frames.alloc() {
            return Ok(frame);
        }
        self.evict_frame()
    }

    /// Fills `frame` with the page's contents. Returns whether the frame is now
    /// the only copy of the data.
    fn populate(&self, frame: FrameNumber, descriptor: &PageDescriptor) -> Result<bool, VmError> {
        let mut data = self.frames.frame(frame);
        match descriptor.location {
            PageLocation::Zero => {
                data.fill(0);
                Ok(false)
            }
            PageLocation::Swap(slot) => {
                self.swap.read_page(slot, &mut data)?;
                Ok(true)
            }
            PageLocation::File => {
                let Some(slice) = descriptor.file_slice() else {
                    panic!("file-backed page {:#X} without a file", descriptor.vaddr);
                };
                let read = slice
                    .file
                    .read_at(&mut data[..slice.valid_bytes], slice.offset)?;
                data[read..].fill(0);
                Ok(false)
            }
            PageLocation::Resident(_) => unreachable!("populating a resident page"),
        }
    }

    /// Makes sure the stack page containing `vaddr` is present, as if the
    /// process had just written to it.
    pub fn grow_stack(&self, pid: Pid, vaddr: usize) -> Result<(), VmError> {
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;
        if !(self.stack_floor()..OFFSET).contains(&vaddr) {
            return Err(VmError::InvalidAddress);
        }
        {
            let mut pages = process.pages.lock();
            if !pages.contains(vaddr) {
                pages.insert(PageDescriptor::zeroed(page_round_down(vaddr), true))?;
            }
        }
        let flags = FaultFlags {
            present: false,
            write: true,
            user: true,
        };
        match self.resolve_fault(&process, vaddr, flags)? {
            FaultOutcome::Resolved => Ok(()),
            FaultOutcome::Rejected(reason) => Err(reason.into()),
        }
    }
}

/// A fault on a page that is already resident. A not-present read raced with
/// its own resolution and is simply retried; a write marks the page dirty if
/// the page may be written. Anything else is a protection violation.
fn resident_fault(
    process: &Process,
    descriptor: &mut PageDescriptor,
    flags: FaultFlags,
) -> FaultOutcome {
    let space = process.space.lock();
    if space.translate(descriptor.vaddr).is_none() {
        panic!(
            "resident page {:#X} of pid {} has no mapping",
            descriptor.vaddr, process.pid
        );
    }
    match (flags.present, flags.write) {
        (false, false) => FaultOutcome::Resolved,
        (true, false) => FaultOutcome::Rejected(RejectReason::Protection),
        (_, true) if !descriptor.writable => FaultOutcome::Rejected(RejectReason::ReadOnly),
        (_, true) => {
            descriptor.dirty = true;
            FaultOutcome::Resolved
        }
    }
}
