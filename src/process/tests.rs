use alloc::vec::Vec;

use super::*;
use crate::constants::process::INITIAL_RFLAGS;

extern "C" fn worker() {}

/// Stands in for the assembly switch: remembers which stack each switch
/// resumed on and marks the saved context.
#[derive(Default)]
struct Recorder {
    resumed_rsp: Vec<u64>,
}

impl ContextSwitch for Recorder {
    unsafe fn save_and_switch(&mut self, from: *mut Context, to: *const Context) {
        (*from).rip = 0xDEAD_BEEF;
        self.resumed_rsp.push((*to).rsp);
    }
}

fn state_of(s: &Scheduler, pid: Pid) -> ProcessState {
    s.get_by_pid(pid).map(|p| p.state).unwrap()
}

#[test]
fn create_builds_a_ready_process() {
    let mut s = Scheduler::new();
    let pid = s.create(worker, 0).unwrap();
    assert_eq!(pid, 1);

    let info = s.get_by_pid(pid).unwrap();
    assert_eq!(info.state, ProcessState::Ready);
    assert_eq!(info.priority, 128);
    assert_eq!(info.stack_size, 4096);

    let ctx = &s.table[s.slot_index(pid).unwrap()].context;
    assert_eq!(ctx.rsp % 16, 0);
    assert_eq!(ctx.rflags, INITIAL_RFLAGS);
    assert_eq!(ctx.entry(), worker as usize as u64);

    let stack = s.table[0].stack.as_ref().unwrap();
    let base = stack.as_ptr() as u64;
    assert!(ctx.rsp > base && ctx.rsp <= base + 4096);
}

#[test]
fn custom_stack_size_is_honoured() {
    let mut s = Scheduler::new();
    let pid = s.create(worker, 8192).unwrap();
    assert_eq!(s.get_by_pid(pid).unwrap().stack_size, 8192);
}

#[test]
fn table_exhaustion_is_reported() {
    let mut s = Scheduler::new();
    for _ in 0..MAX_PROCESSES {
        s.create(worker, 0).unwrap();
    }
    assert_eq!(s.create(worker, 0), Err(ProcessError::TableFull));
    assert_eq!(s.count(), MAX_PROCESSES);
}

#[test]
fn round_robin_visits_everyone_before_repeating() {
    let mut s = Scheduler::new();
    let n = 5;
    for _ in 0..n {
        s.create(worker, 0).unwrap();
    }

    let mut order = Vec::new();
    for _ in 0..3 * n {
        let _ = s.schedule();
        order.push(s.current().unwrap());
    }
    for window in order.windows(n) {
        let mut seen: Vec<Pid> = window.to_vec();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), n, "window {:?} repeated a process", window);
    }

    let running = s
        .snapshot()
        .iter()
        .filter(|p| p.state == ProcessState::Running)
        .count();
    assert_eq!(running, 1);
}

#[test]
fn lone_process_yield_keeps_running() {
    let mut s = Scheduler::new();
    let pid = s.adopt_current().unwrap();
    assert!(s.yield_current().is_none());
    assert_eq!(state_of(&s, pid), ProcessState::Running);
}

#[test]
fn first_switch_saves_into_boot_context() {
    let mut s = Scheduler::new();
    let pid = s.create(worker, 0).unwrap();
    let mut recorder = Recorder::default();

    let plan = s.schedule().unwrap();
    unsafe { plan.perform(&mut recorder) };

    assert_eq!(s.current(), Some(pid));
    assert_eq!(s.boot.rip, 0xDEAD_BEEF);
    let expected = s.table[0].context.rsp;
    assert_eq!(recorder.resumed_rsp, [expected]);
}

#[test]
fn sleeper_wakes_exactly_on_time() {
    let mut s = Scheduler::new();
    let pid = s.create(worker, 0).unwrap();
    let _ = s.schedule();

    // Nothing else can run, so the sleeper stays on the CPU.
    assert!(s.sleep_current(5).is_none());
    for _ in 1..5 {
        s.advance_sleep(1);
        assert_eq!(state_of(&s, pid), ProcessState::Sleeping);
    }
    s.advance_sleep(1);
    assert_eq!(state_of(&s, pid), ProcessState::Ready);
}

#[test]
fn coarse_ticks_wake_at_or_after_deadline() {
    let mut s = Scheduler::new();
    let pid = s.create(worker, 0).unwrap();
    let _ = s.schedule();
    let _ = s.sleep_current(5);

    s.advance_sleep(3);
    assert_eq!(state_of(&s, pid), ProcessState::Sleeping);
    assert_eq!(s.get_by_pid(pid).unwrap().wake_ticks, 2);
    s.advance_sleep(3);
    assert_eq!(state_of(&s, pid), ProcessState::Ready);
    assert_eq!(s.get_by_pid(pid).unwrap().wake_ticks, 0);
}

#[test]
fn tick_wakes_then_switches_immediately() {
    let mut s = Scheduler::new();
    let shell = s.adopt_current().unwrap();
    let job = s.create(worker, 0).unwrap();

    assert!(s.schedule().is_some());
    assert_eq!(s.current(), Some(job));

    assert!(s.sleep_current(3).is_some());
    assert_eq!(s.current(), Some(shell));
    assert_eq!(state_of(&s, job), ProcessState::Sleeping);

    assert!(s.tick(2).is_none());
    assert_eq!(s.current(), Some(shell));

    assert!(s.tick(1).is_some());
    assert_eq!(s.current(), Some(job));
    assert_eq!(state_of(&s, job), ProcessState::Running);
    assert_eq!(state_of(&s, shell), ProcessState::Ready);
}

#[test]
fn killing_a_sleeper_frees_its_slot_for_reuse() {
    let mut s = Scheduler::new();
    s.adopt_current().unwrap();
    let mut pids = Vec::new();
    for _ in 1..MAX_PROCESSES {
        pids.push(s.create(worker, 0).unwrap());
    }
    assert_eq!(s.create(worker, 0), Err(ProcessError::TableFull));

    let victim = pids[0];
    let _ = s.schedule();
    assert_eq!(s.current(), Some(victim));
    let _ = s.sleep_current(1_000);
    assert_eq!(state_of(&s, victim), ProcessState::Sleeping);
    let slot = s.slot_index(victim).unwrap();

    assert!(s.kill(victim).unwrap().is_none());
    assert!(s.get_by_pid(victim).is_none());
    assert!(s.table[slot].stack.is_none());
    assert_eq!(s.count(), MAX_PROCESSES - 1);

    let fresh = s.create(worker, 0).unwrap();
    assert_eq!(s.slot_index(fresh), Some(slot));
    assert_ne!(fresh, victim);
}

#[test]
fn kill_refuses_protected_and_unknown() {
    let mut s = Scheduler::new();
    let shell = s.adopt_current().unwrap();
    assert_eq!(s.kill(shell).err(), Some(ProcessError::Protected));
    assert_eq!(s.kill(42).err(), Some(ProcessError::NoSuchProcess));
    assert_eq!(s.kill(0).err(), Some(ProcessError::NoSuchProcess));
}

#[test]
fn exit_parks_stack_until_taken() {
    let mut s = Scheduler::new();
    let shell = s.adopt_current().unwrap();
    let job = s.create(worker, 0).unwrap();
    let _ = s.schedule();
    assert_eq!(s.current(), Some(job));

    assert!(s.exit_current().is_some());
    assert!(s.zombie.is_some());
    assert!(s.get_by_pid(job).is_none());
    assert_eq!(s.current(), Some(shell));

    // Timer passes never free memory.
    let _ = s.schedule();
    let _ = s.tick(5);
    assert!(s.zombie.is_some());

    let stack = s.take_parked_stack().unwrap();
    assert_eq!(stack.len(), DEFAULT_STACK_SIZE);
    assert!(s.zombie.is_none());
    assert!(s.take_parked_stack().is_none());
}

#[test]
fn lone_exit_leaves_no_current_process() {
    let mut s = Scheduler::new();
    let job = s.create(worker, 0).unwrap();
    let _ = s.schedule();
    assert_eq!(s.current(), Some(job));

    assert!(s.exit_current().is_none());
    assert_eq!(s.current(), None);
    assert_eq!(s.count(), 0);
    // Still executing on the parked stack, so it stays parked.
    assert!(s.take_parked_stack().is_none());
    assert!(s.zombie.is_some());

    let shell = s.adopt_current().unwrap();
    assert_ne!(shell, 0);
    assert_eq!(s.current(), Some(shell));
    assert_eq!(state_of(&s, shell), ProcessState::Running);
    assert!(s.take_parked_stack().is_some());
}

#[test]
fn killing_the_running_process_is_an_exit() {
    let mut s = Scheduler::new();
    let shell = s.adopt_current().unwrap();
    let job = s.create(worker, 0).unwrap();
    let _ = s.schedule();

    assert!(s.kill(job).unwrap().is_some());
    assert_eq!(s.current(), Some(shell));
    assert_eq!(s.count(), 1);
}

#[test]
fn introspection_walks_live_processes() {
    let mut s = Scheduler::new();
    let shell = s.adopt_current().unwrap();
    let a = s.create(worker, 0).unwrap();
    let b = s.create(worker, 0).unwrap();
    s.kill(a).unwrap();

    assert_eq!(s.count(), 2);
    assert_eq!(s.get_by_index(0).map(|p| p.pid), Some(shell));
    assert_eq!(s.get_by_index(1).map(|p| p.pid), Some(b));
    assert!(s.get_by_index(2).is_none());
    assert_eq!(s.get_by_index(0).unwrap().stack_size, 0);

    let pids: Vec<Pid> = s.snapshot().iter().map(|p| p.pid).collect();
    assert_eq!(pids, [shell, b]);
}
