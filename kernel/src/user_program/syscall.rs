use crate::{
    fs::Fd,
    system::{unwrap_system, VmSystem},
    threading::process::Pid,
};
use pageros_syscalls::defs::{MapId, EBADF, EINVAL, ENOSYS, SYS_EXIT, SYS_MMAP, SYS_MUNMAP};

/// Processes a syscall made by `pid`. The return value is the syscall return
/// value: non-negative on success, `-errno` on failure.
pub fn handler(
    system: &VmSystem,
    pid: Pid,
    syscall_number: usize,
    arg0: usize,
    arg1: usize,
    _arg2: usize,
) -> isize {
    log::trace!("pid {pid}: syscall {syscall_number:#X} ({arg0:#X}, {arg1:#X})");
    match syscall_number {
        SYS_EXIT => {
            // Registers are 32 bits wide; the status is their signed reading.
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let status = arg0 as u32 as i32;
            match system.exit_process(pid, status) {
                Ok(()) => 0,
                Err(err) => -err.errno(),
            }
        }
        SYS_MMAP => {
            let Ok(fd) = Fd::try_from(arg0) else {
                return -EBADF;
            };
            match system.create_mapping(pid, fd, arg1) {
                Ok(id) => isize::try_from(id).unwrap_or(-EINVAL),
                Err(err) => -err.errno(),
            }
        }
        SYS_MUNMAP => {
            let Ok(id) = MapId::try_from(arg0) else {
                return -EINVAL;
            };
            match system.destroy_mapping(pid, id) {
                Ok(()) => 0,
                Err(err) => -err.errno(),
            }
        }
        _ => -ENOSYS,
    }
}

/// Trap entry point for the system installed at boot.
pub fn syscall_handler(pid: Pid, syscall_number: usize, arg0: usize, arg1: usize, arg2: usize) -> isize {
    handler(unwrap_system(), pid, syscall_number, arg0, arg1, arg2)
}
