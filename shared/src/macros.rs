use core::fmt;

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(all(target_os = "none", target_arch = "x86"))]
    {
        use core::fmt::Write;
        let _ = crate::serial::SerialWriter.write_fmt(args);
    }
    #[cfg(not(target_os = "none"))]
    std::print!("{args}");
    #[cfg(all(target_os = "none", not(target_arch = "x86")))]
    let _ = args;
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::macros::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::macros::_print(format_args!("{}\n", format_args!($($arg)*)))
    };
}
