//! LuxOS: a small x86_64 kernel with a preemptive round-robin scheduler,
//! the LUXFS filesystem and an interactive shell.
//!
//! Everything that does not touch hardware builds for the host as well, so
//! the scheduler, filesystem, keyboard decoder and shell run under
//! `cargo test`.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

extern crate alloc;

pub mod block;
pub mod constants;
pub mod fs;
pub mod heap;
pub mod keyboard;
pub mod process;
pub mod shell;
pub mod signal;

#[cfg(target_os = "none")]
pub mod gdt;
#[cfg(target_os = "none")]
pub mod interrupts;
#[cfg(target_os = "none")]
pub mod logger;
#[cfg(target_os = "none")]
pub mod serial;
#[cfg(target_os = "none")]
pub mod system;
#[cfg(target_os = "none")]
pub mod timer;
#[cfg(target_os = "none")]
pub mod vga_buffer;

/// Run `f` with maskable interrupts disabled.
#[cfg(target_os = "none")]
pub fn without_interrupts<F: FnOnce() -> R, R>(f: F) -> R {
    x86_64::instructions::interrupts::without_interrupts(f)
}

/// Hosted builds have no interrupts to mask.
#[cfg(not(target_os = "none"))]
pub fn without_interrupts<F: FnOnce() -> R, R>(f: F) -> R {
    f()
}

/// Halt until the next interrupt, forever.
#[cfg(target_os = "none")]
pub fn hlt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}
