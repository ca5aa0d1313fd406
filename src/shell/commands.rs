//! Built-in commands and the table the shell dispatches through.
//!
//! A command gets its arguments without the command name and writes all
//! output, diagnostics included, through its [`CommandIo`].

use alloc::string::String;
use core::fmt::Write;

use super::io::{CommandIo, System};
use super::{resolve_path, Disk, History};
use crate::constants::shell::{
    CAT_CHUNK, HEXDUMP_BYTES_PER_LINE, HEXDUMP_DEFAULT_LEN, HEXDUMP_MAX_LEN,
};
use crate::fs::LuxFs;
use crate::keyboard::Layout;
use crate::process::Pid;

macro_rules! out {
    ($io:expr, $($arg:tt)*) => {{
        let _ = write!($io, $($arg)*);
    }};
}

macro_rules! outln {
    ($io:expr) => {
        out!($io, "\n")
    };
    ($io:expr, $($arg:tt)*) => {{
        let _ = writeln!($io, $($arg)*);
    }};
}

/// Shell state a command may touch.
pub struct Env<'a> {
    pub fs: &'a mut LuxFs<Disk>,
    pub system: &'a mut dyn System,
    pub cwd: &'a mut String,
    pub history: &'a History,
}

/// Command function type
pub type CommandFn = fn(&mut Env<'_>, &[&str], &mut CommandIo<'_>);

/// Command registry entry
pub struct Command {
    pub name: &'static str,
    pub help: &'static str,
    pub func: CommandFn,
}

/// Command dispatch table - add new commands here
pub const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        help: "Display this help message",
        func: cmd_help,
    },
    Command {
        name: "echo",
        help: "Echo arguments to the screen",
        func: cmd_echo,
    },
    Command {
        name: "clear",
        help: "Clear the screen",
        func: cmd_clear,
    },
    Command {
        name: "cd",
        help: "Change the working directory",
        func: cmd_cd,
    },
    Command {
        name: "pwd",
        help: "Print the working directory",
        func: cmd_pwd,
    },
    Command {
        name: "ls",
        help: "List directory contents",
        func: cmd_ls,
    },
    Command {
        name: "cat",
        help: "Display file contents",
        func: cmd_cat,
    },
    Command {
        name: "touch",
        help: "Create files, or write piped data into one",
        func: cmd_touch,
    },
    Command {
        name: "mkdir",
        help: "Create directories",
        func: cmd_mkdir,
    },
    Command {
        name: "stat",
        help: "Show file details or filesystem usage",
        func: cmd_stat,
    },
    Command {
        name: "hexdump",
        help: "Hex dump of a file or piped data",
        func: cmd_hexdump,
    },
    Command {
        name: "sleep",
        help: "Pause execution for N milliseconds",
        func: cmd_sleep,
    },
    Command {
        name: "ps",
        help: "List processes",
        func: cmd_ps,
    },
    Command {
        name: "kill",
        help: "Terminate a process",
        func: cmd_kill,
    },
    Command {
        name: "meminfo",
        help: "Show kernel heap statistics",
        func: cmd_meminfo,
    },
    Command {
        name: "history",
        help: "Show command history",
        func: cmd_history,
    },
    Command {
        name: "layout",
        help: "Show or set the keyboard layout (us, de)",
        func: cmd_layout,
    },
    Command {
        name: "reboot",
        help: "Reboot the system",
        func: cmd_reboot,
    },
];

/// Find command by name
pub fn find(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|cmd| cmd.name == name)
}

fn fs_available(env: &Env<'_>, name: &str, io: &mut CommandIo<'_>) -> bool {
    if env.fs.ready() {
        return true;
    }
    outln!(io, "{}: filesystem not available", name);
    false
}

/// Decimal, or hex with a `0x` prefix.
fn parse_number(text: &str) -> Option<usize> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

// ============================================================================
// Console and session
// ============================================================================

fn cmd_help(_env: &mut Env<'_>, _args: &[&str], io: &mut CommandIo<'_>) {
    outln!(io, "Available commands:");
    for cmd in COMMANDS {
        outln!(io, "  {:<8} - {}", cmd.name, cmd.help);
    }
}

fn cmd_echo(_env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out!(io, " ");
        }
        out!(io, "{}", arg);
    }
    outln!(io);
}

fn cmd_clear(env: &mut Env<'_>, _args: &[&str], _io: &mut CommandIo<'_>) {
    env.system.clear_screen();
}

fn cmd_history(env: &mut Env<'_>, _args: &[&str], io: &mut CommandIo<'_>) {
    if env.history.is_empty() {
        outln!(io, "No command history");
        return;
    }

    outln!(io, "Command history:");
    for (i, line) in env.history.iter().enumerate() {
        outln!(io, "  {} {}", i + 1, line);
    }
}

fn cmd_layout(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    match args {
        [] => outln!(io, "Current layout: {}", env.system.layout().name()),
        [name] => match Layout::from_name(name) {
            Some(layout) => {
                env.system.set_layout(layout);
                outln!(io, "Keyboard layout set to {}", layout.name());
            }
            None => outln!(io, "layout: unknown layout '{}' (use us or de)", name),
        },
        _ => outln!(io, "Usage: layout [us|de]"),
    }
}

fn cmd_reboot(env: &mut Env<'_>, _args: &[&str], io: &mut CommandIo<'_>) {
    outln!(io, "Rebooting system...");
    env.system.reboot();
}

// ============================================================================
// Filesystem
// ============================================================================

fn cmd_pwd(env: &mut Env<'_>, _args: &[&str], io: &mut CommandIo<'_>) {
    outln!(io, "{}", env.cwd);
}

fn cmd_cd(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    if !fs_available(env, "cd", io) {
        return;
    }

    let target = args.first().copied().unwrap_or("/");
    let Some(resolved) = resolve_path(env.cwd, target) else {
        outln!(io, "cd: path too long");
        return;
    };
    match env.fs.stat(&resolved) {
        Ok(stat) if stat.is_dir => *env.cwd = resolved,
        _ => outln!(io, "cd: no such directory: {}", target),
    }
}

fn cmd_ls(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    if !fs_available(env, "ls", io) {
        return;
    }

    if args.is_empty() {
        let cwd = env.cwd.clone();
        list_path(env.fs, &cwd, &cwd, io);
        return;
    }

    let show_header = args.len() > 1;
    for (i, arg) in args.iter().enumerate() {
        if env.system.interrupted() {
            return;
        }
        let Some(resolved) = resolve_path(env.cwd, arg) else {
            outln!(io, "ls: cannot access {}", arg);
            continue;
        };

        if show_header {
            outln!(io, "{}:", resolved);
        }
        list_path(env.fs, &resolved, arg, io);
        if show_header && i + 1 < args.len() {
            outln!(io);
        }
    }
}

fn list_path(fs: &mut LuxFs<Disk>, path: &str, shown: &str, io: &mut CommandIo<'_>) {
    let listed = fs.list(path, |entry| {
        let kind = if entry.is_dir { 'd' } else { '-' };
        outln!(io, "{} {} {}", kind, entry.size, entry.name());
    });
    if let Err(err) = listed {
        outln!(io, "ls: cannot access {}: {}", shown, err);
    }
}

fn cmd_cat(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    if args.is_empty() {
        match io.input() {
            Some(input) if !input.is_empty() => io.write(input),
            _ => outln!(io, "Usage: cat <path> [path...]"),
        }
        return;
    }

    if !fs_available(env, "cat", io) {
        return;
    }

    for path in args {
        if env.system.interrupted() {
            return;
        }
        cat_file(env, path, io);
    }
}

fn cat_file(env: &mut Env<'_>, path: &str, io: &mut CommandIo<'_>) {
    let Some(resolved) = resolve_path(env.cwd, path) else {
        outln!(io, "cat: {}: path too long", path);
        return;
    };
    let stat = match env.fs.stat(&resolved) {
        Ok(stat) => stat,
        Err(err) => {
            outln!(io, "cat: {}: {}", path, err);
            return;
        }
    };
    if stat.is_dir {
        outln!(io, "cat: {}: is a directory", path);
        return;
    }

    let mut buf = [0u8; CAT_CHUNK];
    let mut offset = 0;
    while offset < stat.size as usize {
        if env.system.interrupted() {
            return;
        }
        match env.fs.read(&resolved, offset, &mut buf) {
            Ok(0) => break,
            Ok(n) => {
                io.write(&buf[..n]);
                offset += n;
            }
            Err(err) => {
                outln!(io, "cat: {}: {}", path, err);
                return;
            }
        }
    }
}

fn cmd_touch(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    if args.is_empty() {
        outln!(io, "Usage: touch <path> [path...]");
        outln!(io, "Pipe data into touch to overwrite a single file.");
        return;
    }

    if !fs_available(env, "touch", io) {
        return;
    }

    let input = io.input();
    if input.is_some() && args.len() > 1 {
        outln!(io, "touch: piped data requires a single target");
        return;
    }

    for path in args {
        let Some(resolved) = resolve_path(env.cwd, path) else {
            outln!(io, "touch: {}: path too long", path);
            continue;
        };
        if let Err(err) = env.fs.touch(&resolved) {
            outln!(io, "touch: {}: {}", path, err);
            continue;
        }
        if let Some(data) = input {
            if let Err(err) = env.fs.write(&resolved, 0, data, true) {
                outln!(io, "touch: {}: {}", path, err);
            }
        }
    }
}

fn cmd_mkdir(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    if args.is_empty() {
        outln!(io, "Usage: mkdir <path> [path...]");
        return;
    }

    if !fs_available(env, "mkdir", io) {
        return;
    }

    for path in args {
        let Some(resolved) = resolve_path(env.cwd, path) else {
            outln!(io, "mkdir: {}: path too long", path);
            continue;
        };
        if let Err(err) = env.fs.mkdir(&resolved) {
            outln!(io, "mkdir: {}: {}", path, err);
        }
    }
}

fn cmd_stat(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    if !fs_available(env, "stat", io) {
        return;
    }

    if args.is_empty() {
        let usage = env.fs.usage();
        outln!(io, "Inodes: {} / {} used", usage.inodes_used, usage.inodes_total);
        outln!(io, "Blocks: {} / {} used", usage.blocks_used, usage.blocks_total);
        return;
    }

    for path in args {
        let Some(resolved) = resolve_path(env.cwd, path) else {
            outln!(io, "stat: {}: path too long", path);
            continue;
        };
        match env.fs.stat(&resolved) {
            Ok(stat) => {
                outln!(io, "  File: {}", resolved);
                outln!(io, "  Type: {}", if stat.is_dir { "directory" } else { "file" });
                outln!(io, "  Size: {} bytes", stat.size);
                outln!(io, " Inode: {}", stat.inode);
            }
            Err(err) => outln!(io, "stat: {}: {}", path, err),
        }
    }
}

/// `hexdump <path> [length]`, or `... | hexdump [length]`.
fn cmd_hexdump(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    let (path, length_arg) = match (io.input(), args) {
        (Some(_), []) => (None, None),
        (Some(_), [length]) => (None, Some(*length)),
        (None, [path]) => (Some(*path), None),
        (None, [path, length]) => (Some(*path), Some(*length)),
        _ => {
            outln!(io, "Usage: hexdump <path> [length]");
            outln!(io, "       <command> | hexdump [length]");
            return;
        }
    };

    let length = match length_arg.map(parse_number) {
        None => HEXDUMP_DEFAULT_LEN,
        Some(Some(0)) => {
            outln!(io, "Length must be greater than zero.");
            return;
        }
        Some(Some(n)) => n.min(HEXDUMP_MAX_LEN),
        Some(None) => {
            outln!(io, "Invalid length. Use decimal or 0x-prefixed hex.");
            return;
        }
    };

    let mut buf = [0u8; HEXDUMP_MAX_LEN];
    let data: &[u8] = match path {
        None => {
            let input = io.input().unwrap_or_default();
            &input[..input.len().min(length)]
        }
        Some(path) => {
            if !fs_available(env, "hexdump", io) {
                return;
            }
            let Some(resolved) = resolve_path(env.cwd, path) else {
                outln!(io, "hexdump: {}: path too long", path);
                return;
            };
            match env.fs.read(&resolved, 0, &mut buf[..length]) {
                Ok(n) => &buf[..n],
                Err(err) => {
                    outln!(io, "hexdump: {}: {}", path, err);
                    return;
                }
            }
        }
    };

    for (line, chunk) in data.chunks(HEXDUMP_BYTES_PER_LINE).enumerate() {
        if env.system.interrupted() {
            return;
        }
        out!(io, "{:08X}: ", line * HEXDUMP_BYTES_PER_LINE);
        for i in 0..HEXDUMP_BYTES_PER_LINE {
            match chunk.get(i) {
                Some(byte) => out!(io, "{:02X} ", byte),
                None => out!(io, "   "),
            }
        }
        out!(io, " ");
        for &byte in chunk {
            let c = if (0x20..=0x7e).contains(&byte) {
                byte as char
            } else {
                '.'
            };
            out!(io, "{}", c);
        }
        outln!(io);
    }
}

// ============================================================================
// Processes and memory
// ============================================================================

fn cmd_sleep(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    let [value] = args else {
        outln!(io, "Usage: sleep <milliseconds>");
        return;
    };
    let Ok(duration) = value.parse::<u32>() else {
        outln!(io, "sleep: invalid millisecond value");
        return;
    };

    for _ in 0..duration {
        if env.system.interrupted() {
            return;
        }
        env.system.sleep_ms(1);
    }
}

fn cmd_ps(env: &mut Env<'_>, _args: &[&str], io: &mut CommandIo<'_>) {
    let processes = env.system.processes();
    if processes.is_empty() {
        outln!(io, "(no processes)");
        return;
    }

    outln!(io, "PID  STATE     PRIORITY");
    outln!(io, "---  -----     --------");
    for p in processes {
        outln!(io, "{:>3}  {:<8}  {}", p.pid, p.state.as_str(), p.priority);
    }
}

fn cmd_kill(env: &mut Env<'_>, args: &[&str], io: &mut CommandIo<'_>) {
    let [value] = args else {
        outln!(io, "Usage: kill <pid>");
        return;
    };
    let Ok(pid) = value.parse::<Pid>() else {
        outln!(io, "kill: invalid pid: {}", value);
        return;
    };
    if let Err(err) = env.system.kill(pid) {
        outln!(io, "kill: {}: {}", pid, err);
    }
}

fn cmd_meminfo(env: &mut Env<'_>, _args: &[&str], io: &mut CommandIo<'_>) {
    let stats = env.system.heap_stats();
    outln!(io, "Kernel heap usage:");
    outln!(io, "  Total: {} bytes", stats.total);
    outln!(io, "  Used : {} bytes", stats.used);
    outln!(io, "  Free : {} bytes", stats.free);
    outln!(io, "  Largest free block: {} bytes", stats.largest_free_block);
    outln!(io, "  Allocations: {}", stats.allocation_count);
    outln!(io, "  Free blocks: {}", stats.free_block_count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_unique() {
        for (i, a) in COMMANDS.iter().enumerate() {
            assert!(COMMANDS[i + 1..].iter().all(|b| b.name != a.name));
        }
        assert!(find("hexdump").is_some());
        assert!(find("nope").is_none());
    }

    #[test]
    fn numbers_accept_decimal_and_hex() {
        assert_eq!(parse_number("64"), Some(64));
        assert_eq!(parse_number("0x40"), Some(64));
        assert_eq!(parse_number("0XfF"), Some(255));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("12a"), None);
    }
}
