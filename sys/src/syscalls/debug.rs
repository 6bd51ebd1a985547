use core::fmt::{self, Write};

use spin::Mutex;

#[cfg(not(feature = "hosted-mock"))]
use crate::syscall_nums::PRINT_DEBUG;

/// Prints `data` to the kernel debug log, or to stderr under the hosted-mock
/// backend where there is no kernel log to write to.
pub fn debug_print(data: &[u8]) {
    #[cfg(not(feature = "hosted-mock"))]
    unsafe {
        crate::syscall!(PRINT_DEBUG, data.as_ptr() as usize, data.len());
    }

    #[cfg(feature = "hosted-mock")]
    {
        use std::io::Write as _;
        let _ = std::io::stderr().write_all(data);
    }
}

/// A writer which writes output to the debug_print syscall.
struct DebugWriter;

impl Write for DebugWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        debug_print(s.as_bytes());
        Ok(())
    }
}

static DEBUG_WRITER: Mutex<DebugWriter> = Mutex::new(DebugWriter);

#[doc(hidden)]
pub fn _dprint(args: fmt::Arguments) {
    DEBUG_WRITER.lock().write_fmt(args).unwrap();
}

#[macro_export]
macro_rules! dprint {
    ($($arg:tt)*) => ($crate::_dprint(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! dprintln {
    () => ($crate::dprint!("\n"));
    ($($arg:tt)*) => ($crate::dprint!("{}\n", format_args!($($arg)*)));
}
