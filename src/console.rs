// SPDX-License-Identifier: MPL-2.0

//! Console output.

use core::fmt::{Arguments, Write};

struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        if let Some(console) = crate::collab::console() {
            console.write_str(s);
        }
        Ok(())
    }
}

/// Prints formatted arguments to the registered [`Console`](crate::collab::Console).
///
/// Silently drops output if no console has been registered yet, so that
/// early boot logging before `collab::register_console` doesn't panic.
pub fn print(args: Arguments) {
    let _ = core::fmt::write(&mut ConsoleWriter, args);
}

/// Prints to the console.
#[macro_export]
macro_rules! early_print {
  ($fmt: literal $(, $($arg: tt)+)?) => {
    $crate::console::print(format_args!($fmt $(, $($arg)+)?))
  }
}

/// Prints to the console, with a newline.
#[macro_export]
macro_rules! early_println {
  () => { $crate::early_print!("\n") };
  ($fmt: literal $(, $($arg: tt)+)?) => {
    $crate::console::print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?))
  }
}
