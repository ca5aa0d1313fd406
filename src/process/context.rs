//! Saved CPU state and the switch primitive.
//!
//! Only callee-saved registers are kept: every switch happens through an
//! ordinary function call, so the compiler has already spilled the rest.

use crate::constants::process::INITIAL_RFLAGS;

/// Body of a process. Returning from it exits the process.
pub type Entry = extern "C" fn();

/// Field offsets are used by the switch routine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
}

impl Context {
    /// Fresh context that starts `entry` on a stack ending at `stack_top`.
    ///
    /// `stack_top` must be 16-byte aligned. The entry pointer rides in r12
    /// and the start trampoline calls it, then exits the process.
    pub fn new(entry: Entry, stack_top: usize) -> Self {
        let entry = entry as usize as u64;
        Context {
            r12: entry,
            rsp: stack_top as u64,
            rip: start_address(entry),
            rflags: INITIAL_RFLAGS,
            ..Context::default()
        }
    }

    pub fn entry(&self) -> u64 {
        self.r12
    }
}

#[cfg(target_os = "none")]
fn start_address(_entry: u64) -> u64 {
    extern "C" {
        fn luxos_process_start();
    }
    luxos_process_start as usize as u64
}

/// Hosted builds never jump into a context; point straight at the entry.
#[cfg(not(target_os = "none"))]
fn start_address(entry: u64) -> u64 {
    entry
}

pub trait ContextSwitch {
    /// Save the running CPU state into `from` and resume `to`.
    ///
    /// # Safety
    /// Both pointers must reference live contexts that stay put until the
    /// saved one is resumed. Interrupts must be disabled.
    unsafe fn save_and_switch(&mut self, from: *mut Context, to: *const Context);
}

/// A switch decided by the scheduler, performed after its lock is dropped.
#[must_use]
#[derive(Debug)]
pub struct SwitchPlan {
    pub from: *mut Context,
    pub to: *const Context,
}

impl SwitchPlan {
    /// # Safety
    /// See [`ContextSwitch::save_and_switch`].
    pub unsafe fn perform<S: ContextSwitch>(self, switcher: &mut S) {
        switcher.save_and_switch(self.from, self.to);
    }
}

#[cfg(target_os = "none")]
pub use arch::ArchSwitch;

#[cfg(target_os = "none")]
mod arch {
    use super::{Context, ContextSwitch};

    // rdi = from, rsi = to. Offsets follow `Context`.
    core::arch::global_asm!(
        r#"
.global luxos_switch_context
luxos_switch_context:
    mov [rdi + 0x00], rbx
    mov [rdi + 0x08], rbp
    mov [rdi + 0x10], r12
    mov [rdi + 0x18], r13
    mov [rdi + 0x20], r14
    mov [rdi + 0x28], r15
    pushfq
    pop rax
    mov [rdi + 0x40], rax
    mov rax, [rsp]
    mov [rdi + 0x38], rax
    lea rax, [rsp + 8]
    mov [rdi + 0x30], rax

    mov rbx, [rsi + 0x00]
    mov rbp, [rsi + 0x08]
    mov r12, [rsi + 0x10]
    mov r13, [rsi + 0x18]
    mov r14, [rsi + 0x20]
    mov r15, [rsi + 0x28]
    mov rsp, [rsi + 0x30]
    push qword ptr [rsi + 0x40]
    popfq
    jmp qword ptr [rsi + 0x38]

.global luxos_process_start
luxos_process_start:
    call r12
    call {exit}
    ud2
"#,
        exit = sym crate::process::kernel::exit_from_entry,
    );

    extern "C" {
        fn luxos_switch_context(from: *mut Context, to: *const Context);
    }

    pub struct ArchSwitch;

    impl ContextSwitch for ArchSwitch {
        unsafe fn save_and_switch(&mut self, from: *mut Context, to: *const Context) {
            luxos_switch_context(from, to);
        }
    }
}
