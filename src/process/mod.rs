//! Fixed-size process table with round-robin scheduling.
//!
//! `Scheduler` only decides: every operation that may change the running
//! process returns a [`SwitchPlan`] which the caller performs once the
//! scheduler lock is released. The kernel-side wrappers at the bottom of
//! this module do exactly that with interrupts disabled.

mod context;

use alloc::vec::Vec;
use core::fmt;

use crate::constants::process::{DEFAULT_PRIORITY, DEFAULT_STACK_SIZE, MAX_PROCESSES};

pub use context::{Context, ContextSwitch, Entry, SwitchPlan};

#[cfg(target_os = "none")]
pub use context::ArchSwitch;

pub type Pid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Sleeping,
    Stopped,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Sleeping => "SLEEPING",
            ProcessState::Stopped => "STOPPED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// All slots are in use
    TableFull,
    /// Stack allocation failed
    OutOfMemory,
    NoSuchProcess,
    /// The process may not be killed
    Protected,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ProcessError::TableFull => "process table full",
            ProcessError::OutOfMemory => "out of memory",
            ProcessError::NoSuchProcess => "no such process",
            ProcessError::Protected => "process is protected",
        };
        f.write_str(msg)
    }
}

/// Process control block.
struct Process {
    pid: Pid,
    state: ProcessState,
    context: Context,
    stack: Option<Vec<u8>>,
    wake_ticks: u32,
    priority: u8,
    protected: bool,
}

impl Process {
    const fn free() -> Self {
        Process {
            pid: 0,
            state: ProcessState::Stopped,
            context: Context {
                rbx: 0,
                rbp: 0,
                r12: 0,
                r13: 0,
                r14: 0,
                r15: 0,
                rsp: 0,
                rip: 0,
                rflags: 0,
            },
            stack: None,
            wake_ticks: 0,
            priority: DEFAULT_PRIORITY,
            protected: false,
        }
    }

    fn is_free(&self) -> bool {
        self.pid == 0 && self.state == ProcessState::Stopped
    }

    fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            state: self.state,
            priority: self.priority,
            wake_ticks: self.wake_ticks,
            stack_size: self.stack.as_ref().map_or(0, Vec::len),
        }
    }
}

/// Read-only view of one process, for `ps` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub state: ProcessState,
    pub priority: u8,
    pub wake_ticks: u32,
    /// Zero for the adopted boot thread
    pub stack_size: usize,
}

pub struct Scheduler {
    table: [Process; MAX_PROCESSES],
    current: Option<usize>,
    last: usize,
    next_pid: Pid,
    /// Stack of a process that exited itself, handed back by
    /// [`take_parked_stack`](Self::take_parked_stack)
    zombie: Option<Vec<u8>>,
    /// Save area for the boot flow before anything was adopted
    boot: Context,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        const FREE: Process = Process::free();
        Scheduler {
            table: [FREE; MAX_PROCESSES],
            current: None,
            last: MAX_PROCESSES - 1,
            next_pid: 1,
            zombie: None,
            boot: Context {
                rbx: 0,
                rbp: 0,
                r12: 0,
                r13: 0,
                r14: 0,
                r15: 0,
                rsp: 0,
                rip: 0,
                rflags: 0,
            },
        }
    }

    fn free_slot(&self) -> Option<usize> {
        self.table.iter().position(Process::is_free)
    }

    fn claim_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid = self.next_pid.checked_add(1).unwrap_or(1);
        pid
    }

    fn slot_of(&self, pid: Pid) -> Option<usize> {
        if pid == 0 {
            return None;
        }
        self.table.iter().position(|p| p.pid == pid)
    }

    /// Create a READY process running `entry`. A zero `stack_size` selects
    /// the default.
    pub fn create(&mut self, entry: Entry, stack_size: usize) -> Result<Pid, ProcessError> {
        let slot = self.free_slot().ok_or_else(|| {
            log::warn!("process: table full");
            ProcessError::TableFull
        })?;
        let size = if stack_size == 0 {
            DEFAULT_STACK_SIZE
        } else {
            stack_size
        };

        let mut stack = Vec::new();
        stack
            .try_reserve_exact(size)
            .map_err(|_| ProcessError::OutOfMemory)?;
        stack.resize(size, 0);
        let top = (stack.as_ptr() as usize + size) & !0xF;

        let pid = self.claim_pid();
        self.table[slot] = Process {
            pid,
            state: ProcessState::Ready,
            context: Context::new(entry, top),
            stack: Some(stack),
            wake_ticks: 0,
            priority: DEFAULT_PRIORITY,
            protected: false,
        };
        log::debug!("process: created pid {} in slot {}", pid, slot);
        Ok(pid)
    }

    /// Register the already running flow of control as a process.
    ///
    /// It owns no stack and cannot be killed.
    pub fn adopt_current(&mut self) -> Result<Pid, ProcessError> {
        if let Some(slot) = self.current {
            return Ok(self.table[slot].pid);
        }
        let slot = self.free_slot().ok_or(ProcessError::TableFull)?;
        let pid = self.claim_pid();
        self.table[slot] = Process {
            pid,
            state: ProcessState::Running,
            protected: true,
            ..Process::free()
        };
        self.current = Some(slot);
        self.last = slot;
        Ok(pid)
    }

    /// Stop the running process and pick a replacement.
    ///
    /// The caller is still executing on the exiting stack, so it is parked
    /// rather than freed. An older parked stack is released here.
    pub fn exit_current(&mut self) -> Option<SwitchPlan> {
        let slot = self.current?;
        let process = &mut self.table[slot];
        log::debug!("process: pid {} exited", process.pid);
        self.zombie = process.stack.take();
        process.state = ProcessState::Stopped;
        process.pid = 0;
        process.wake_ticks = 0;
        process.protected = false;

        let plan = self.pick();
        if self.current == Some(slot) {
            // Nothing left to run; the slot is free again.
            self.current = None;
        }
        plan
    }

    /// Put the running process to sleep for `ticks` and pick another.
    pub fn sleep_current(&mut self, ticks: u32) -> Option<SwitchPlan> {
        let slot = self.current?;
        if ticks == 0 {
            return self.yield_current();
        }
        let process = &mut self.table[slot];
        process.state = ProcessState::Sleeping;
        process.wake_ticks = ticks;
        self.schedule()
    }

    pub fn yield_current(&mut self) -> Option<SwitchPlan> {
        if let Some(slot) = self.current {
            if self.table[slot].state == ProcessState::Running {
                self.table[slot].state = ProcessState::Ready;
            }
        }
        self.schedule()
    }

    /// Terminate `pid`. Killing the running process behaves like
    /// [`exit_current`](Self::exit_current); any other process is torn down
    /// on the spot.
    pub fn kill(&mut self, pid: Pid) -> Result<Option<SwitchPlan>, ProcessError> {
        let slot = self.slot_of(pid).ok_or(ProcessError::NoSuchProcess)?;
        if self.table[slot].protected {
            return Err(ProcessError::Protected);
        }
        if Some(slot) == self.current {
            return Ok(self.exit_current());
        }
        self.table[slot] = Process::free();
        log::debug!("process: killed pid {}", pid);
        Ok(None)
    }

    /// Round-robin pick starting one past the last scheduled slot.
    ///
    /// Never frees memory, so it is safe from the timer interrupt.
    pub fn schedule(&mut self) -> Option<SwitchPlan> {
        self.pick()
    }

    /// Hand over the stack of a process that exited itself, once the CPU
    /// runs on some other process's stack. The caller drops it.
    pub fn take_parked_stack(&mut self) -> Option<Vec<u8>> {
        self.current?;
        let stack = self.zombie.take();
        if stack.is_some() {
            log::trace!("process: reaped parked stack");
        }
        stack
    }

    fn pick(&mut self) -> Option<SwitchPlan> {
        let next = self.select()?;
        self.last = next;

        if Some(next) == self.current {
            if self.table[next].state == ProcessState::Ready {
                self.table[next].state = ProcessState::Running;
            }
            return None;
        }

        let from = match self.current {
            Some(cur) => {
                if self.table[cur].state == ProcessState::Running {
                    self.table[cur].state = ProcessState::Ready;
                }
                &mut self.table[cur].context as *mut Context
            }
            None => &mut self.boot as *mut Context,
        };
        if self.table[next].state == ProcessState::Ready {
            self.table[next].state = ProcessState::Running;
        }
        self.current = Some(next);

        Some(SwitchPlan {
            from,
            to: &self.table[next].context as *const Context,
        })
    }

    fn select(&self) -> Option<usize> {
        let order = (1..=MAX_PROCESSES).map(|step| (self.last + step) % MAX_PROCESSES);

        if let Some(slot) = order
            .clone()
            .find(|&i| self.table[i].state == ProcessState::Ready)
        {
            return Some(slot);
        }
        if let Some(cur) = self.current {
            if self.table[cur].state == ProcessState::Running {
                return Some(cur);
            }
        }
        order
            .into_iter()
            .find(|&i| self.table[i].state != ProcessState::Stopped)
    }

    /// Count down sleepers, waking those whose time is up.
    pub fn advance_sleep(&mut self, ticks_elapsed: u32) {
        for process in self
            .table
            .iter_mut()
            .filter(|p| p.state == ProcessState::Sleeping)
        {
            process.wake_ticks = process.wake_ticks.saturating_sub(ticks_elapsed);
            if process.wake_ticks == 0 {
                process.state = ProcessState::Ready;
            }
        }
    }

    /// Timer entry point.
    pub fn tick(&mut self, ticks_elapsed: u32) -> Option<SwitchPlan> {
        self.advance_sleep(ticks_elapsed);
        self.schedule()
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn count(&self) -> usize {
        self.table.iter().filter(|p| !p.is_free()).count()
    }

    /// The `index`-th live process in table order.
    pub fn get_by_index(&self, index: usize) -> Option<ProcessInfo> {
        self.table
            .iter()
            .filter(|p| !p.is_free())
            .nth(index)
            .map(Process::info)
    }

    pub fn get_by_pid(&self, pid: Pid) -> Option<ProcessInfo> {
        self.slot_of(pid).map(|slot| self.table[slot].info())
    }

    pub fn current(&self) -> Option<Pid> {
        self.current.map(|slot| self.table[slot].pid).filter(|&pid| pid != 0)
    }

    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        self.table
            .iter()
            .filter(|p| !p.is_free())
            .map(Process::info)
            .collect()
    }

    #[cfg(test)]
    fn slot_index(&self, pid: Pid) -> Option<usize> {
        self.slot_of(pid)
    }
}

// -------------------------------------------------------------------------
// Kernel-side wrappers around the global scheduler
// -------------------------------------------------------------------------

#[cfg(target_os = "none")]
pub use kernel::*;

#[cfg(target_os = "none")]
mod kernel {
    use core::sync::atomic::{AtomicU64, Ordering};

    use spin::Mutex;
    use x86_64::instructions::{hlt, interrupts};

    use super::*;

    pub static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

    /// Tick count at the last scheduler pass that actually ran.
    static LAST_TICK: AtomicU64 = AtomicU64::new(0);

    /// Decide under the lock, switch after dropping it.
    ///
    /// Parked stacks are released here, on the way back into a process,
    /// and never from the timer interrupt.
    fn switch_with<F>(decide: F)
    where
        F: FnOnce(&mut Scheduler) -> Option<SwitchPlan>,
    {
        let parked = interrupts::without_interrupts(|| {
            let plan = {
                let mut scheduler = SCHEDULER.lock();
                decide(&mut scheduler)
            };
            if let Some(plan) = plan {
                unsafe { plan.perform(&mut ArchSwitch) };
            }
            SCHEDULER.lock().take_parked_stack()
        });
        drop(parked);
    }

    pub fn adopt_current() -> Result<Pid, ProcessError> {
        interrupts::without_interrupts(|| SCHEDULER.lock().adopt_current())
    }

    pub fn spawn(entry: Entry, stack_size: usize) -> Result<Pid, ProcessError> {
        interrupts::without_interrupts(|| SCHEDULER.lock().create(entry, stack_size))
    }

    pub fn yield_now() {
        switch_with(Scheduler::yield_current);
    }

    /// Block the caller for at least `ticks` timer ticks.
    ///
    /// If nothing else is runnable the scheduler leaves the sleeper on the
    /// CPU, so wait out the deadline here.
    pub fn sleep(ticks: u32) {
        let deadline = crate::timer::ticks() + ticks as u64;
        loop {
            let now = crate::timer::ticks();
            if now >= deadline {
                break;
            }
            switch_with(|s| s.sleep_current((deadline - now) as u32));
            if crate::timer::ticks() < deadline {
                hlt();
            }
        }
        switch_with(|s| {
            if let Some(slot) = s.current {
                if s.table[slot].state == ProcessState::Sleeping {
                    s.table[slot].state = ProcessState::Running;
                    s.table[slot].wake_ticks = 0;
                }
            }
            None
        });
    }

    pub fn exit() -> ! {
        switch_with(Scheduler::exit_current);
        loop {
            hlt();
        }
    }

    pub fn kill(pid: Pid) -> Result<(), ProcessError> {
        let mut result = Ok(());
        switch_with(|s| match s.kill(pid) {
            Ok(plan) => plan,
            Err(err) => {
                result = Err(err);
                None
            }
        });
        result
    }

    /// Called from the timer interrupt after EOI. Passes skipped ticks on
    /// if an earlier pass found the scheduler busy.
    pub fn on_tick(now: u64) {
        let plan = match SCHEDULER.try_lock() {
            Some(mut scheduler) => {
                let elapsed = now.saturating_sub(LAST_TICK.swap(now, Ordering::Relaxed));
                scheduler.tick(elapsed.min(u32::MAX as u64) as u32)
            }
            None => return,
        };
        if let Some(plan) = plan {
            unsafe { plan.perform(&mut ArchSwitch) };
        }
    }

    pub fn snapshot() -> Vec<ProcessInfo> {
        interrupts::without_interrupts(|| SCHEDULER.lock().snapshot())
    }

    pub(super) extern "C" fn exit_from_entry() -> ! {
        exit()
    }
}

#[cfg(test)]
mod tests;
