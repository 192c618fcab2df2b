// syscall numbers and error codes
// Shared by the kernel's dispatcher and the userspace stubs in lib.rs.

/// Identifies a live memory mapping within one process.
pub type MapId = u32;

pub const STDIN_FILENO: u32 = 0;
pub const STDOUT_FILENO: u32 = 1;

pub const ESRCH: isize = 3;
pub const EIO: isize = 5;
pub const EBADF: isize = 9;
pub const ENOMEM: isize = 12;
pub const EFAULT: isize = 14;
pub const EEXIST: isize = 17;
pub const EINVAL: isize = 22;
pub const ENOSPC: isize = 28;
pub const ENOSYS: isize = 38;

pub const SYS_EXIT: usize = 0x1;
pub const SYS_MMAP: usize = 0x5a;
pub const SYS_MUNMAP: usize = 0x5b;
