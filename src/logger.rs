//! `log` backend: every record to COM1, warnings and errors to the screen too.

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::{println, serial_println};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        serial_println!("[{}] {}: {}", record.level(), record.target(), record.args());
        if record.level() <= Level::Warn {
            println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the logger. A second call is ignored.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
