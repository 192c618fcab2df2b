use core::{
    arch::asm,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

const IO_BASE: u16 = 0x3f8;
const THR: u16 = IO_BASE; // Transmitter Holding Reg (write-only)
const IER: u16 = IO_BASE + 1; // Interrupt Enable Reg
const FCR: u16 = IO_BASE + 2; // FIFO Control Reg (write-only)
const LCR: u16 = IO_BASE + 3; // Line Control Register
const MCR: u16 = IO_BASE + 4; // MODEM Control Register
const LSR: u16 = IO_BASE + 5; // Line Status Register (read-only)

static INITIALIZED: AtomicBool = AtomicBool::new(false);

unsafe fn outb(port: u16, byte: u8) {
    asm!("out dx, al", in("dx") port, in("al") byte)
}

unsafe fn inb(port: u16) -> u8 {
    let res: u8;
    asm!("in al, dx", in("dx") port, out("al") res);
    res
}

/// Writes to COM1. Carries no state of its own; the port is programmed the
/// first time anything is written.
pub struct SerialWriter;

impl SerialWriter {
    fn ensure_initialized() {
        if INITIALIZED.swap(true, Ordering::AcqRel) {
            return;
        }

        // SAFETY: https://wiki.osdev.org/Serial_Ports#Initialization
        unsafe {
            outb(IER, 0x00);
            outb(LCR, 0x80);
            outb(THR, 0x03);
            outb(IER, 0x00);
            outb(LCR, 0x03);
            outb(FCR, 0xC7);
            outb(MCR, 0x0F);
        }
    }
}

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Self::ensure_initialized();

        for b in s.bytes() {
            // SAFETY: Waits for the transmit buffer to drain before writing.
            unsafe {
                while inb(LSR) & 0x20 == 0 {}
                outb(THR, b);
            }
        }

        Ok(())
    }
}
