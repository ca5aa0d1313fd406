//! PIT channel 0 as the scheduler's tick source.

use core::sync::atomic::{AtomicU64, Ordering};

use x86_64::instructions::port::Port;

use crate::constants::pit::{
    BASE_FREQUENCY, CHANNEL_0_PORT, CMD_CHANNEL_0_RATE_GENERATOR, COMMAND_PORT, TICK_HZ,
};

/// Ticks since `init`.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Program channel 0 to fire IRQ0 `TICK_HZ` times per second.
pub fn init() {
    let divisor = (BASE_FREQUENCY / TICK_HZ) as u16;
    let mut command = Port::<u8>::new(COMMAND_PORT);
    let mut channel0 = Port::<u8>::new(CHANNEL_0_PORT);
    unsafe {
        command.write(CMD_CHANNEL_0_RATE_GENERATOR);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
    log::info!("pit: {} Hz (divisor {})", TICK_HZ, divisor);
}

/// Count one tick; returns the new total.
pub fn on_interrupt() -> u64 {
    TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

pub fn ms_to_ticks(ms: u64) -> u64 {
    (ms * TICK_HZ as u64).div_ceil(1000)
}
