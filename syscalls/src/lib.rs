#![no_std]

pub mod defs;

pub use defs::*;

#[cfg(target_arch = "x86")]
mod stubs {
    use super::MapId;
    use core::arch::asm;

    #[no_mangle]
    pub extern "C" fn exit(code: i32) -> ! {
        unsafe {
            asm!("
                mov eax, 0x1
                int 0x80
            ", in("ebx") code, options(noreturn));
        }
    }

    /// Maps the whole of the file open as `fd` at `addr`, which must be page
    /// aligned. Returns the mapping id, or a negative errno.
    #[no_mangle]
    pub extern "C" fn mmap(fd: u32, addr: *mut u8) -> i32 {
        let result;
        unsafe {
            asm!("
                mov eax, 0x5a
                int 0x80
            ", in("ebx") fd, in("ecx") addr, lateout("eax") result);
        }
        result
    }

    #[no_mangle]
    pub extern "C" fn munmap(id: MapId) -> i32 {
        let result;
        unsafe {
            asm!("
                mov eax, 0x5b
                int 0x80
            ", in("ebx") id, lateout("eax") result);
        }
        result
    }
}
