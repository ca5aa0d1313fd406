//! LuxOS entry point.
//!
//! On bare metal this is the kernel: bring up the CPU tables, heap, logging,
//! interrupts and the disk, then hand the keyboard to the shell. Built for
//! the host it runs the same shell on stdin/stdout over a RAM disk.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

extern crate alloc;

#[cfg(target_os = "none")]
mod kernel {
    use alloc::boxed::Box;
    use core::panic::PanicInfo;

    use log::LevelFilter;
    use luxos::block::ata::AtaPio;
    use luxos::fs::LuxFs;
    use luxos::shell::{Disk, Shell};
    use luxos::signal::{self, Signal};
    use luxos::system::{self, KernelSystem};
    use luxos::vga_buffer::VgaConsole;
    use luxos::{gdt, heap, interrupts, keyboard, logger, println, process, timer};

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        x86_64::instructions::interrupts::disable();
        println!("KERNEL PANIC: {}", info);
        luxos::hlt_loop();
    }

    #[no_mangle]
    pub extern "C" fn _start() -> ! {
        gdt::init();
        heap::init();
        logger::init(LevelFilter::Info);
        interrupts::init();
        timer::init();

        let mut ata = AtaPio::new();
        if let Err(err) = ata.init() {
            log::warn!("kernel: disk unavailable: {}", err);
        }
        let mut fs = LuxFs::new(Box::new(ata) as Disk);
        if let Err(err) = fs.mount() {
            log::warn!("kernel: filesystem not mounted: {}", err);
        }

        if let Err(err) = process::adopt_current() {
            log::error!("kernel: cannot register the shell process: {}", err);
        }
        if let Err(err) = signal::subscribe(Signal::CtrlC, system::on_ctrl_c, 0) {
            log::error!("kernel: ctrl-c unavailable: {}", err);
        }

        interrupts::enable();

        println!("Welcome to LuxOS");
        println!("Type 'help' for available commands.");

        let mut shell = Shell::new(VgaConsole, KernelSystem, fs);
        shell.prompt();
        loop {
            shell.handle_key(keyboard::read_event());
        }
    }
}

#[cfg(not(target_os = "none"))]
mod host {
    use std::io::{self, BufRead, Write};

    use log::{LevelFilter, Log, Metadata, Record};
    use luxos::block::RamDisk;
    use luxos::constants::luxfs::{START_LBA, TOTAL_SECTORS};
    use luxos::fs::LuxFs;
    use luxos::heap::HeapStats;
    use luxos::keyboard::Layout;
    use luxos::process::{Pid, ProcessError, ProcessInfo};
    use luxos::shell::{Console, Disk, Shell, System};

    struct StderrLogger;

    static LOGGER: StderrLogger = StderrLogger;

    impl Log for StderrLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
            }
        }

        fn flush(&self) {}
    }

    struct Stdout;

    impl Console for Stdout {
        fn write_bytes(&mut self, bytes: &[u8]) {
            let mut out = io::stdout().lock();
            let _ = out.write_all(bytes);
            let _ = out.flush();
        }

        fn cursor_left(&mut self, n: usize) {
            if n > 0 {
                self.write_str(&format!("\x1b[{}D", n));
            }
        }
    }

    /// No scheduler or heap to report on; only the clock and the layout.
    struct HostSystem {
        layout: Layout,
    }

    impl System for HostSystem {
        fn sleep_ms(&mut self, ms: u64) {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        }

        fn interrupted(&self) -> bool {
            false
        }

        fn clear_interrupt(&mut self) {}

        fn processes(&self) -> Vec<ProcessInfo> {
            Vec::new()
        }

        fn kill(&mut self, _pid: Pid) -> Result<(), ProcessError> {
            Err(ProcessError::NoSuchProcess)
        }

        fn heap_stats(&self) -> HeapStats {
            HeapStats::default()
        }

        fn layout(&self) -> Layout {
            self.layout
        }

        fn set_layout(&mut self, layout: Layout) {
            self.layout = layout;
        }

        fn clear_screen(&mut self) {
            print!("\x1b[2J\x1b[H");
        }

        fn reboot(&mut self) {
            std::process::exit(0);
        }
    }

    pub fn run() {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Warn);
        }

        let disk: Disk = Box::new(RamDisk::new(START_LBA + TOTAL_SECTORS));
        let mut fs = LuxFs::new(disk);
        if let Err(err) = fs.mount() {
            log::warn!("host: filesystem not mounted: {}", err);
        }

        let system = HostSystem {
            layout: Layout::German,
        };
        let mut shell = Shell::new(Stdout, system, fs);
        shell.prompt();
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => shell.run_line(line.trim_end()),
                Err(err) => {
                    log::error!("host: stdin: {}", err);
                    break;
                }
            }
        }
        println!();
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    host::run();
}
