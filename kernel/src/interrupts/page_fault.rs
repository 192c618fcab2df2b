use crate::{
    mem::fault::{FaultFlags, FaultOutcome},
    system::{unwrap_system, VmSystem},
    threading::process::Pid,
};
use bitbybit::bitfield;

/// Error code pushed by the CPU for a page fault.
#[bitfield(u32, default = 0)]
pub struct PageFaultErrorCode {
    #[bit(0, r)]
    present: bool,
    #[bit(1, r)]
    write: bool,
    #[bit(2, r)]
    user: bool,
    #[bit(3, r)]
    reserved_write: bool,
    #[bit(4, r)]
    instruction_fetch: bool,
}

impl From<PageFaultErrorCode> for FaultFlags {
    fn from(code: PageFaultErrorCode) -> Self {
        Self {
            present: code.present(),
            write: code.write(),
            user: code.user(),
        }
    }
}

/// Decodes a page fault taken by `pid` at `vaddr` and resolves it.
///
/// `esp` is the stack pointer saved by the trap. It is only trusted for faults
/// from user mode; kernel-mode faults on user memory happen during system
/// calls, which record the user stack pointer on entry.
pub fn handle(
    system: &VmSystem,
    pid: Pid,
    error_code: u32,
    vaddr: usize,
    esp: usize,
) -> FaultOutcome {
    let code = PageFaultErrorCode::new_with_raw_value(error_code);
    assert!(
        !code.reserved_write(),
        "page table corruption: reserved bit set, fault at {vaddr:#X} with error code {error_code:#b}"
    );
    if code.user() {
        // The process may already be gone; `on_page_fault` reports that.
        let _ = system.set_stack_pointer(pid, esp);
    }
    log::trace!(
        "page fault at {vaddr:#X} by pid {pid}, error code {error_code:#b}{}",
        if code.instruction_fetch() { " (fetch)" } else { "" }
    );
    system.on_page_fault(pid, vaddr, code.into())
}

/// Trap entry point for the system installed at boot.
pub fn page_fault_handler(pid: Pid, error_code: u32, vaddr: usize, esp: usize) -> FaultOutcome {
    handle(unwrap_system(), pid, error_code, vaddr, esp)
}
