//! What the shell needs from the machine, and what a command gets to talk to.

use alloc::vec::Vec;
use core::fmt;

use crate::heap::HeapStats;
use crate::keyboard::Layout;
use crate::process::{Pid, ProcessError, ProcessInfo};

/// Where the shell echoes keystrokes and prints command output.
pub trait Console {
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Move the cursor `n` cells back without erasing anything.
    fn cursor_left(&mut self, n: usize);

    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

/// Kernel services used by the built-in commands.
pub trait System {
    fn sleep_ms(&mut self, ms: u64);

    /// True once Ctrl-C has been raised since the last `clear_interrupt`.
    fn interrupted(&self) -> bool;
    fn clear_interrupt(&mut self);

    fn processes(&self) -> Vec<ProcessInfo>;
    fn kill(&mut self, pid: Pid) -> Result<(), ProcessError>;
    fn heap_stats(&self) -> HeapStats;

    fn layout(&self) -> Layout;
    fn set_layout(&mut self, layout: Layout);

    fn clear_screen(&mut self);
    fn reboot(&mut self);
}

/// Per-stage I/O: the previous stage's output, if piped, and a sink.
pub struct CommandIo<'a> {
    input: Option<&'a [u8]>,
    out: &'a mut dyn FnMut(&[u8]),
}

impl<'a> CommandIo<'a> {
    pub fn new(input: Option<&'a [u8]>, out: &'a mut dyn FnMut(&[u8])) -> Self {
        CommandIo { input, out }
    }

    /// Piped input. `None` for the first stage, possibly empty after it.
    pub fn input(&self) -> Option<&'a [u8]> {
        self.input
    }

    pub fn write(&mut self, bytes: &[u8]) {
        (self.out)(bytes);
    }
}

impl fmt::Write for CommandIo<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}
