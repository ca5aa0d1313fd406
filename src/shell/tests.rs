use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use super::*;
use crate::block::RamDisk;
use crate::constants::luxfs::MAX_FILE_SIZE;
use crate::fs::Geometry;
use crate::heap::HeapStats;
use crate::keyboard::{Layout, Modifiers};
use crate::process::{Pid, ProcessError, ProcessInfo, ProcessState};

/// One-row terminal: keeps the full transcript plus the row being edited.
#[derive(Default)]
struct Screen {
    transcript: String,
    row: Vec<u8>,
    col: usize,
}

impl Screen {
    fn row(&self) -> String {
        String::from_utf8_lossy(&self.row).trim_end().to_string()
    }
}

impl Console for Screen {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.transcript.push_str(&String::from_utf8_lossy(bytes));
        for &b in bytes {
            if b == b'\n' {
                self.row.clear();
                self.col = 0;
                continue;
            }
            if self.col < self.row.len() {
                self.row[self.col] = b;
            } else {
                self.row.push(b);
            }
            self.col += 1;
        }
    }

    fn cursor_left(&mut self, n: usize) {
        assert!(n <= self.col, "cursor moved past column 0");
        self.col -= n;
    }
}

struct MockSystem {
    slept: u64,
    /// Raise Ctrl-C once this many milliseconds have been slept
    interrupt_after: Option<u64>,
    interrupted: bool,
    processes: Vec<ProcessInfo>,
    killed: Vec<Pid>,
    layout: Layout,
    cleared: bool,
    rebooted: bool,
}

impl MockSystem {
    fn new() -> Self {
        MockSystem {
            slept: 0,
            interrupt_after: None,
            interrupted: false,
            processes: Vec::new(),
            killed: Vec::new(),
            layout: Layout::German,
            cleared: false,
            rebooted: false,
        }
    }
}

impl System for MockSystem {
    fn sleep_ms(&mut self, ms: u64) {
        self.slept += ms;
        if Some(self.slept) == self.interrupt_after {
            self.interrupted = true;
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupted
    }

    fn clear_interrupt(&mut self) {
        self.interrupted = false;
    }

    fn processes(&self) -> Vec<ProcessInfo> {
        self.processes.clone()
    }

    fn kill(&mut self, pid: Pid) -> Result<(), ProcessError> {
        match self.processes.iter().position(|p| p.pid == pid) {
            Some(_) if pid == 1 => Err(ProcessError::Protected),
            Some(i) => {
                self.processes.remove(i);
                self.killed.push(pid);
                Ok(())
            }
            None => Err(ProcessError::NoSuchProcess),
        }
    }

    fn heap_stats(&self) -> HeapStats {
        HeapStats {
            total: 1_048_576,
            used: 4096,
            free: 1_044_480,
            largest_free_block: 1_040_000,
            allocation_count: 12,
            free_block_count: 3,
        }
    }

    fn layout(&self) -> Layout {
        self.layout
    }

    fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    fn clear_screen(&mut self) {
        self.cleared = true;
    }

    fn reboot(&mut self) {
        self.rebooted = true;
    }
}

type TestShell = Shell<Screen, MockSystem>;

fn volume() -> LuxFs<Disk> {
    let geometry = Geometry::new(8, 128, 32).unwrap();
    LuxFs::with_geometry(Box::new(RamDisk::new(136)) as Disk, geometry)
}

fn shell() -> TestShell {
    let mut fs = volume();
    fs.mount().unwrap();
    let mut sh = Shell::new(Screen::default(), MockSystem::new(), fs);
    sh.prompt();
    sh
}

fn key(symbol: char) -> KeyEvent {
    KeyEvent {
        symbol,
        modifiers: Modifiers::empty(),
        pressed: true,
    }
}

fn type_keys(sh: &mut TestShell, text: &str) {
    for c in text.chars() {
        sh.handle_key(key(c));
    }
}

/// Output of one command line, without prompt or echo.
fn run(sh: &mut TestShell, line: &str) -> String {
    let start = sh.console().transcript.len();
    sh.execute(line);
    sh.console().transcript[start..].to_string()
}

fn transcript(sh: &TestShell) -> &str {
    &sh.console().transcript
}

#[test]
fn resolve_path_normalises() {
    assert_eq!(resolve_path("/", "docs").as_deref(), Some("/docs"));
    assert_eq!(resolve_path("/docs", "a/./b/").as_deref(), Some("/docs/a/b"));
    assert_eq!(resolve_path("/docs/a", "../..").as_deref(), Some("/"));
    assert_eq!(resolve_path("/docs", "/../../x").as_deref(), Some("/x"));
    assert_eq!(resolve_path("/docs", "//x//y").as_deref(), Some("/x/y"));

    let long = "a".repeat(300);
    assert_eq!(resolve_path("/", &long), None);
}

#[test]
fn typed_line_runs_and_reprompts() {
    let mut sh = shell();
    type_keys(&mut sh, "echo hi\n");
    assert_eq!(transcript(&sh), "lux:/> echo hi\nhi\nlux:/> ");
    assert_eq!(sh.history().get(0), Some("echo hi"));
    assert_eq!(sh.line(), "");
}

#[test]
fn cursor_editing_rewrites_the_line() {
    let mut sh = shell();
    type_keys(&mut sh, "eho");
    sh.handle_key(key(keys::ARROW_LEFT));
    sh.handle_key(key(keys::ARROW_LEFT));
    type_keys(&mut sh, "c");
    assert_eq!(sh.line(), "echo");
    assert_eq!(sh.console().row(), "lux:/> echo");
    assert_eq!(sh.console().col, 9);

    sh.handle_key(key(keys::END));
    type_keys(&mut sh, " x");
    sh.handle_key(key(keys::HOME));
    assert_eq!(sh.console().col, 7);
    sh.handle_key(key(keys::DELETE));
    assert_eq!(sh.line(), "cho x");
    assert_eq!(sh.console().row(), "lux:/> cho x");

    type_keys(&mut sh, "e");
    assert_eq!(sh.console().row(), "lux:/> echo x");
    sh.handle_key(key(keys::ARROW_RIGHT));
    sh.handle_key(key(keys::BACKSPACE));
    assert_eq!(sh.line(), "eho x");
    assert_eq!(sh.console().row(), "lux:/> eho x");
    assert_eq!(sh.console().col, 8);

    sh.handle_key(key(keys::BACKSPACE));
    sh.handle_key(key(keys::BACKSPACE));
    sh.handle_key(key(keys::BACKSPACE));
    assert_eq!(sh.line(), "ho x");
    assert_eq!(sh.console().row(), "lux:/> ho x");
    assert_eq!(sh.console().col, 7);
}

#[test]
fn line_length_is_capped() {
    let mut sh = shell();
    let long = "x".repeat(200);
    type_keys(&mut sh, &long);
    assert_eq!(sh.line().len(), 127);
}

#[test]
fn history_browsing_with_arrows() {
    let mut sh = shell();
    type_keys(&mut sh, "echo one\n");
    type_keys(&mut sh, "echo two\n");

    sh.handle_key(key(keys::ARROW_UP));
    assert_eq!(sh.line(), "echo two");
    sh.handle_key(key(keys::ARROW_UP));
    assert_eq!(sh.line(), "echo one");
    sh.handle_key(key(keys::ARROW_UP));
    assert_eq!(sh.line(), "echo one");
    assert_eq!(sh.console().row(), "lux:/> echo one");

    sh.handle_key(key(keys::ARROW_DOWN));
    assert_eq!(sh.line(), "echo two");
    sh.handle_key(key(keys::ARROW_DOWN));
    assert_eq!(sh.line(), "");
    assert_eq!(sh.console().row(), "lux:/>");

    // A recalled, edited line runs as shown.
    sh.handle_key(key(keys::ARROW_UP));
    sh.handle_key(key(keys::BACKSPACE));
    type_keys(&mut sh, "o\n");
    assert!(transcript(&sh).ends_with("\ntwo\nlux:/> "));
}

#[test]
fn ctrl_c_abandons_the_line() {
    let mut sh = shell();
    type_keys(&mut sh, "echo x");
    sh.handle_key(key(keys::ETX));
    assert_eq!(transcript(&sh), "lux:/> echo x^C\nlux:/> ");
    assert_eq!(sh.line(), "");
    assert!(sh.history().is_empty());
}

#[test]
fn interrupted_command_stops_and_swallows_queued_etx() {
    let mut sh = shell();
    sh.system_mut().interrupt_after = Some(5);
    type_keys(&mut sh, "sleep 100\n");
    assert_eq!(sh.system().slept, 5);
    assert!(transcript(&sh).ends_with("sleep 100\n^C\nlux:/> "));

    let before = transcript(&sh).len();
    sh.handle_key(key(keys::ETX));
    assert_eq!(transcript(&sh).len(), before);

    type_keys(&mut sh, "pwd\n");
    assert!(transcript(&sh).ends_with("pwd\n/\nlux:/> "));
}

#[test]
fn sleep_waits_and_validates() {
    let mut sh = shell();
    assert_eq!(run(&mut sh, "sleep 25"), "");
    assert_eq!(sh.system().slept, 25);
    assert_eq!(run(&mut sh, "sleep"), "Usage: sleep <milliseconds>\n");
    assert_eq!(run(&mut sh, "sleep 1s"), "sleep: invalid millisecond value\n");
}

#[test]
fn tab_completes_command_names() {
    let mut sh = shell();
    type_keys(&mut sh, "hexd\t");
    assert_eq!(sh.line(), "hexdump ");
    sh.handle_key(key(keys::ETX));

    type_keys(&mut sh, "c\t");
    assert_eq!(sh.line(), "c");
    assert!(transcript(&sh).ends_with("c\nclear  cd  cat\nlux:/> c"));

    sh.handle_key(key(keys::ETX));
    type_keys(&mut sh, "echo a | pw\t");
    assert_eq!(sh.line(), "echo a | pwd ");
}

#[test]
fn tab_completes_paths() {
    let mut sh = shell();
    run(&mut sh, "mkdir /docs");
    run(&mut sh, "touch /docs/readme /alpha /alps");

    type_keys(&mut sh, "cat /docs/re\t");
    assert_eq!(sh.line(), "cat /docs/readme ");
    sh.handle_key(key(keys::ETX));

    type_keys(&mut sh, "ls /do\t");
    assert_eq!(sh.line(), "ls /docs/");
    sh.handle_key(key(keys::ETX));

    type_keys(&mut sh, "cat /al\t");
    assert_eq!(sh.line(), "cat /alp");
    type_keys(&mut sh, "\t");
    assert_eq!(sh.line(), "cat /alp");
    assert!(transcript(&sh).ends_with("\nalpha  alps\nlux:/> cat /alp"));
    sh.handle_key(key(keys::ETX));

    run(&mut sh, "cd /docs");
    sh.prompt();
    type_keys(&mut sh, "cat r\t");
    assert_eq!(sh.line(), "cat readme ");
}

#[test]
fn redirection_truncates_and_appends() {
    let mut sh = shell();
    assert_eq!(run(&mut sh, "echo hello > note"), "");
    assert_eq!(run(&mut sh, "echo world >> note"), "");
    assert_eq!(run(&mut sh, "cat note"), "hello\nworld\n");

    run(&mut sh, "echo new > note");
    assert_eq!(run(&mut sh, "cat /note"), "new\n");

    run(&mut sh, "mkdir /d");
    assert_eq!(run(&mut sh, "echo x > /d"), "/d: is a directory\n");
}

#[test]
fn pipes_feed_the_next_stage() {
    let mut sh = shell();
    assert_eq!(run(&mut sh, "echo abc | cat"), "abc\n");

    let expected = format!("00000000: 61 62 63 0A {} abc.\n", "   ".repeat(12));
    assert_eq!(run(&mut sh, "echo abc | hexdump"), expected);

    assert_eq!(run(&mut sh, "echo data | touch /f"), "");
    assert_eq!(run(&mut sh, "cat /f"), "data\n");
    assert_eq!(
        run(&mut sh, "echo x | touch /a /b"),
        "touch: piped data requires a single target\n"
    );
    assert_eq!(run(&mut sh, "cat /a"), "cat: /a: no such file or directory\n");
}

#[test]
fn pipe_buffer_is_bounded() {
    let mut sh = shell();
    let fs = sh.fs_mut();
    fs.touch("/a").unwrap();
    fs.write("/a", 0, &[b'a'; MAX_FILE_SIZE], true).unwrap();
    fs.touch("/b").unwrap();
    fs.write("/b", 0, &[b'b'; MAX_FILE_SIZE], true).unwrap();

    let out = run(&mut sh, "cat /a /b | cat");
    let expected = format!(
        "cat: output truncated to 4096 bytes\n{}",
        "a".repeat(PIPE_CAPACITY)
    );
    assert_eq!(out, expected);
}

#[test]
fn cd_and_pwd_track_the_working_directory() {
    let mut sh = shell();
    run(&mut sh, "mkdir /docs /docs/sub");
    assert_eq!(run(&mut sh, "cd docs/sub"), "");
    assert_eq!(sh.cwd(), "/docs/sub");
    assert_eq!(run(&mut sh, "pwd"), "/docs/sub\n");
    sh.prompt();
    assert!(transcript(&sh).ends_with("lux:/docs/sub> "));

    run(&mut sh, "cd ../..");
    assert_eq!(sh.cwd(), "/");
    run(&mut sh, "cd /docs/../docs/./sub");
    assert_eq!(sh.cwd(), "/docs/sub");

    run(&mut sh, "touch /f");
    assert_eq!(run(&mut sh, "cd /f"), "cd: no such directory: /f\n");
    assert_eq!(run(&mut sh, "cd /nope"), "cd: no such directory: /nope\n");
    assert_eq!(sh.cwd(), "/docs/sub");
    run(&mut sh, "cd");
    assert_eq!(sh.cwd(), "/");
}

#[test]
fn ls_formats_entries() {
    let mut sh = shell();
    run(&mut sh, "mkdir /docs");
    run(&mut sh, "echo hi > /docs/a");
    assert_eq!(run(&mut sh, "ls /docs"), "- 3 a\n");
    assert_eq!(run(&mut sh, "ls"), "d 36 docs\n");
    assert_eq!(run(&mut sh, "ls /docs/a"), "- 3 a\n");
    assert_eq!(
        run(&mut sh, "ls /docs /nope"),
        "/docs:\n- 3 a\n\n/nope:\nls: cannot access /nope: no such file or directory\n"
    );
}

#[test]
fn file_errors_are_reported() {
    let mut sh = shell();
    assert_eq!(run(&mut sh, "cat"), "Usage: cat <path> [path...]\n");
    assert_eq!(
        run(&mut sh, "cat /missing"),
        "cat: /missing: no such file or directory\n"
    );
    run(&mut sh, "mkdir /d");
    assert_eq!(run(&mut sh, "cat /d"), "cat: /d: is a directory\n");
    assert_eq!(run(&mut sh, "mkdir /d"), "mkdir: /d: already exists\n");
    assert_eq!(run(&mut sh, "touch /d"), "touch: /d: is a directory\n");
    assert_eq!(run(&mut sh, "mkdir"), "Usage: mkdir <path> [path...]\n");
    assert_eq!(
        run(&mut sh, "touch"),
        "Usage: touch <path> [path...]\nPipe data into touch to overwrite a single file.\n"
    );
}

#[test]
fn stat_reports_file_and_usage() {
    let mut sh = shell();
    run(&mut sh, "echo hi > /f");
    assert_eq!(
        run(&mut sh, "stat /f"),
        "  File: /f\n  Type: file\n  Size: 3 bytes\n Inode: 1\n"
    );
    assert_eq!(run(&mut sh, "stat"), "Inodes: 2 / 32 used\nBlocks: 2 / 121 used\n");
}

#[test]
fn hexdump_reads_files() {
    let mut sh = shell();
    run(&mut sh, "echo 0123456789abcdefXYZ > /h");

    let expected = format!(
        "00000000: 30 31 32 33 34 35 36 37 38 39 61 62 63 64 65 66  0123456789abcdef\n\
         00000010: 58 {} X\n",
        "   ".repeat(15)
    );
    assert_eq!(run(&mut sh, "hexdump /h 0x11"), expected);

    assert_eq!(run(&mut sh, "hexdump /h 0"), "Length must be greater than zero.\n");
    assert_eq!(
        run(&mut sh, "hexdump /h zz"),
        "Invalid length. Use decimal or 0x-prefixed hex.\n"
    );
    assert!(run(&mut sh, "hexdump").starts_with("Usage: hexdump <path> [length]\n"));
    assert_eq!(
        run(&mut sh, "hexdump /none"),
        "hexdump: /none: no such file or directory\n"
    );
}

#[test]
fn process_commands_use_the_system() {
    let mut sh = shell();
    assert_eq!(run(&mut sh, "ps"), "(no processes)\n");

    let info = |pid, state| ProcessInfo {
        pid,
        state,
        priority: 128,
        wake_ticks: 0,
        stack_size: 0,
    };
    sh.system_mut().processes = vec![
        info(1, ProcessState::Running),
        info(2, ProcessState::Sleeping),
    ];
    assert_eq!(
        run(&mut sh, "ps"),
        "PID  STATE     PRIORITY\n\
         ---  -----     --------\n  \
         1  RUNNING   128\n  \
         2  SLEEPING  128\n"
    );

    assert_eq!(run(&mut sh, "kill 2"), "");
    assert_eq!(sh.system().killed, [2]);
    assert_eq!(run(&mut sh, "kill 1"), "kill: 1: process is protected\n");
    assert_eq!(run(&mut sh, "kill 9"), "kill: 9: no such process\n");
    assert_eq!(run(&mut sh, "kill x"), "kill: invalid pid: x\n");
    assert_eq!(run(&mut sh, "kill"), "Usage: kill <pid>\n");
}

#[test]
fn system_commands() {
    let mut sh = shell();
    assert_eq!(
        run(&mut sh, "meminfo"),
        "Kernel heap usage:\n  Total: 1048576 bytes\n  Used : 4096 bytes\n  Free : 1044480 bytes\n  \
         Largest free block: 1040000 bytes\n  Allocations: 12\n  Free blocks: 3\n"
    );

    assert_eq!(run(&mut sh, "layout"), "Current layout: de\n");
    assert_eq!(run(&mut sh, "layout us"), "Keyboard layout set to us\n");
    assert_eq!(sh.system().layout, Layout::Us);
    assert_eq!(
        run(&mut sh, "layout fr"),
        "layout: unknown layout 'fr' (use us or de)\n"
    );

    run(&mut sh, "clear");
    assert!(sh.system().cleared);
    assert_eq!(run(&mut sh, "reboot"), "Rebooting system...\n");
    assert!(sh.system().rebooted);

    let help = run(&mut sh, "help");
    assert!(help.starts_with("Available commands:\n"));
    assert!(help.contains("  hexdump  - "));
    assert_eq!(help.lines().count(), COMMANDS.len() + 1);
}

#[test]
fn history_command_lists_lines() {
    let mut sh = shell();
    assert_eq!(run(&mut sh, "history"), "No command history\n");
    type_keys(&mut sh, "echo a\n");
    type_keys(&mut sh, "history\n");
    assert!(transcript(&sh).ends_with("Command history:\n  1 echo a\n  2 history\nlux:/> "));
}

#[test]
fn unknown_commands_and_parse_errors() {
    let mut sh = shell();
    assert_eq!(
        run(&mut sh, "frob"),
        "Unknown command: frob. Type 'help' for available commands.\n"
    );
    assert_eq!(run(&mut sh, "echo |"), "parse error: empty command in pipeline\n");
    assert_eq!(
        run(&mut sh, "echo x > /out | frob"),
        "parse error: unexpected input after redirection\n"
    );
    // Nothing runs when any stage is unknown.
    assert_eq!(
        run(&mut sh, "echo hi > /f | cat"),
        "parse error: unexpected input after redirection\n"
    );
    assert_eq!(
        run(&mut sh, "echo hi | frob"),
        "Unknown command: frob. Type 'help' for available commands.\n"
    );
}

#[test]
fn unmounted_filesystem_is_reported() {
    let mut sh = Shell::new(Screen::default(), MockSystem::new(), volume());
    assert_eq!(run(&mut sh, "ls"), "ls: filesystem not available\n");
    assert_eq!(run(&mut sh, "cat /x"), "cat: filesystem not available\n");
    assert_eq!(run(&mut sh, "echo hi > /f"), "/f: filesystem not ready\n");
    assert_eq!(run(&mut sh, "echo still works"), "still works\n");

    type_keys(&mut sh, "cat /\t");
    assert_eq!(sh.line(), "cat /");
}
