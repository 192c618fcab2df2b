//! Copying between kernel buffers and user memory. Every access goes through
//! the process's page tables, faulting pages in exactly as a user load or
//! store would.

use crate::{
    mem::{
        error::VmError,
        fault::{FaultFlags, FaultOutcome},
    },
    paging::AccessFault,
    system::VmSystem,
    threading::process::Pid,
};
use alloc::{vec, vec::Vec};
use core::cmp::min;
use pageros_shared::mem::{page_offset, page_round_down, OFFSET, PAGE_FRAME_SIZE};

impl VmSystem {
    pub fn copy_to_user(&self, pid: Pid, vaddr: usize, bytes: &[u8]) -> Result<(), VmError> {
        self.walk_user(pid, vaddr, bytes.len(), true, |frame, done| {
            let len = frame.len();
            frame.copy_from_slice(&bytes[done..done + len]);
        })
    }

    pub fn copy_from_user(&self, pid: Pid, vaddr: usize, len: usize) -> Result<Vec<u8>, VmError> {
        let mut bytes = vec![0; len];
        self.walk_user(pid, vaddr, len, false, |frame, done| {
            bytes[done..done + frame.len()].copy_from_slice(frame);
        })?;
        Ok(bytes)
    }

    /// Calls `copy` with each page-sized piece of `[vaddr, vaddr + len)` as it
    /// sits in its frame, along with how many bytes came before it. A fault
    /// that gets rejected ends the walk; the process is gone by then.
    fn walk_user(
        &self,
        pid: Pid,
        vaddr: usize,
        len: usize,
        write: bool,
        mut copy: impl FnMut(&mut [u8], usize),
    ) -> Result<(), VmError> {
        let end = vaddr.checked_add(len).ok_or(VmError::InvalidAddress)?;
        // Trying to touch kernel memory.
        if end > OFFSET {
            return Err(VmError::InvalidAddress);
        }
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;

        let mut done = 0;
        while done < len {
            let addr = vaddr + done;
            let start = page_offset(addr);
            let chunk = min(PAGE_FRAME_SIZE - start, len - done);
            loop {
                let mut space = process.space.lock();
                let fault = match space.access(page_round_down(addr), write) {
                    Ok(frame) => {
                        let mut data = self.frames.frame(frame);
                        copy(&mut data[start..start + chunk], done);
                        break;
                    }
                    Err(fault) => fault,
                };
                drop(space);

                let flags = FaultFlags {
                    present: fault == AccessFault::ReadOnly,
                    write,
                    user: false,
                };
                if let FaultOutcome::Rejected(reason) = self.on_page_fault(pid, addr, flags) {
                    return Err(reason.into());
                }
            }
            done += chunk;
        }
        Ok(())
    }
}
