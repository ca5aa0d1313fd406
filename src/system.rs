//! The running kernel as seen by the shell's built-in commands.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::heap::{self, HeapStats};
use crate::keyboard::{self, Layout};
use crate::process::{self, Pid, ProcessError, ProcessInfo};
use crate::shell::System;
use crate::signal::Signal;
use crate::{timer, vga_buffer};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Ctrl-C subscriber. Runs in interrupt context, so it only sets a flag.
pub fn on_ctrl_c(_signal: Signal, _context: usize) {
    INTERRUPTED.store(true, Ordering::Release);
}

pub struct KernelSystem;

impl System for KernelSystem {
    fn sleep_ms(&mut self, ms: u64) {
        let ticks = timer::ms_to_ticks(ms).min(u32::MAX as u64) as u32;
        process::sleep(ticks);
    }

    fn interrupted(&self) -> bool {
        INTERRUPTED.load(Ordering::Acquire)
    }

    fn clear_interrupt(&mut self) {
        INTERRUPTED.store(false, Ordering::Release);
    }

    fn processes(&self) -> Vec<ProcessInfo> {
        process::snapshot()
    }

    fn kill(&mut self, pid: Pid) -> Result<(), ProcessError> {
        process::kill(pid)
    }

    fn heap_stats(&self) -> HeapStats {
        heap::stats()
    }

    fn layout(&self) -> Layout {
        keyboard::layout()
    }

    fn set_layout(&mut self, layout: Layout) {
        keyboard::set_layout(layout);
    }

    fn clear_screen(&mut self) {
        vga_buffer::clear_screen();
    }

    fn reboot(&mut self) {
        log::info!("system: reboot requested");
        keyboard::reset_cpu();
    }
}
