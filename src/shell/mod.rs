//! Interactive shell: line editor, history, Tab completion and pipelines.
//!
//! The shell is driven one [`KeyEvent`] at a time and never blocks; the
//! caller owns the input loop. Everything it prints goes through a
//! [`Console`], everything it asks of the kernel through a [`System`].

pub mod commands;
mod history;
pub mod io;
pub mod parse;

#[cfg(test)]
mod tests;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::block::BlockDevice;
use crate::constants::shell::{LINE_BUF_LEN, PATH_MAX, PIPE_CAPACITY};
use crate::fs::{FsError, LuxFs};
use crate::keyboard::{keys, KeyEvent};

use commands::{Env, COMMANDS};
use io::CommandIo;
use parse::Redirect;

pub use history::History;
pub use io::{Console, System};

/// The disk the shell's filesystem sits on.
pub type Disk = Box<dyn BlockDevice>;

/// Join `path` onto `cwd` and fold away `.`, `..` and empty segments.
///
/// `..` at the root stays at the root. Returns `None` when the result
/// would not fit in `PATH_MAX`.
pub fn resolve_path(cwd: &str, path: &str) -> Option<String> {
    let base = if path.starts_with('/') { "" } else { cwd };
    let mut parts: Vec<&str> = Vec::new();
    for part in base.split('/').chain(path.split('/')) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    let mut out = String::new();
    for part in &parts {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    (out.len() < PATH_MAX).then_some(out)
}

struct ConsoleWriter<'a, C: Console>(&'a mut C);

impl<C: Console> fmt::Write for ConsoleWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

fn say<C: Console>(console: &mut C, args: fmt::Arguments<'_>) {
    let _ = fmt::Write::write_fmt(&mut ConsoleWriter(console), args);
}

/// Output buffer between two pipeline stages. Excess bytes are dropped.
#[derive(Default)]
struct Pipe {
    data: Vec<u8>,
    overflowed: bool,
}

impl Pipe {
    fn push(&mut self, bytes: &[u8]) {
        let room = PIPE_CAPACITY - self.data.len();
        if bytes.len() > room {
            self.overflowed = true;
        }
        self.data.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }
}

pub struct Shell<C: Console, S: System> {
    console: C,
    system: S,
    fs: LuxFs<Disk>,
    cwd: String,
    /// Printable ASCII only, so byte and char positions agree.
    line: String,
    cursor: usize,
    history: History,
    /// Index into `history` while browsing with Up/Down
    browse: Option<usize>,
    /// A command was cut short by Ctrl-C; the queued ETX is already handled.
    swallow_etx: bool,
}

impl<C: Console, S: System> Shell<C, S> {
    pub fn new(console: C, system: S, fs: LuxFs<Disk>) -> Self {
        Shell {
            console,
            system,
            fs,
            cwd: String::from("/"),
            line: String::with_capacity(LINE_BUF_LEN),
            cursor: 0,
            history: History::new(),
            browse: None,
            swallow_etx: false,
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }

    pub fn fs_mut(&mut self) -> &mut LuxFs<Disk> {
        &mut self.fs
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// The line being edited.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn prompt(&mut self) {
        say(&mut self.console, format_args!("lux:{}> ", self.cwd));
    }

    pub fn handle_key(&mut self, event: KeyEvent) {
        if !event.pressed {
            return;
        }
        let swallow = core::mem::take(&mut self.swallow_etx);

        match event.symbol {
            '\n' | '\r' => self.submit(),
            keys::ETX if swallow => {}
            keys::ETX => self.cancel_line(),
            keys::BACKSPACE => self.backspace(),
            keys::DELETE => self.delete(),
            keys::ARROW_LEFT => self.move_left(),
            keys::ARROW_RIGHT => self.move_right(),
            keys::HOME => self.home(),
            keys::END => self.end(),
            keys::ARROW_UP => self.history_prev(),
            keys::ARROW_DOWN => self.history_next(),
            '\t' => self.complete(),
            c if (' '..='~').contains(&c) => self.insert(c),
            _ => {}
        }
    }

    /// Record, execute and re-prompt, as if `line` had been typed.
    pub fn run_line(&mut self, line: &str) {
        self.history.push(line);
        self.execute(line);
        self.prompt();
    }

    /// Parse and run one command line.
    pub fn execute(&mut self, line: &str) {
        self.system.clear_interrupt();

        let pipeline = match parse::parse(line) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => return,
            Err(err) => {
                say(&mut self.console, format_args!("parse error: {}\n", err));
                return;
            }
        };

        let mut stages = Vec::with_capacity(pipeline.stages.len());
        for argv in &pipeline.stages {
            match commands::find(argv[0]) {
                Some(cmd) => stages.push((cmd, &argv[1..])),
                None => {
                    say(
                        &mut self.console,
                        format_args!(
                            "Unknown command: {}. Type 'help' for available commands.\n",
                            argv[0]
                        ),
                    );
                    return;
                }
            }
        }

        let Shell {
            console,
            system,
            fs,
            cwd,
            history,
            swallow_etx,
            ..
        } = self;
        let mut env = Env {
            fs,
            system,
            cwd,
            history,
        };

        let last = stages.len() - 1;
        let mut input: Option<Vec<u8>> = None;
        for (i, (cmd, args)) in stages.into_iter().enumerate() {
            if i == last && pipeline.redirect.is_none() {
                let mut sink = |bytes: &[u8]| console.write_bytes(bytes);
                let mut io = CommandIo::new(input.as_deref(), &mut sink);
                (cmd.func)(&mut env, args, &mut io);
                input = None;
            } else {
                let mut pipe = Pipe::default();
                {
                    let mut sink = |bytes: &[u8]| pipe.push(bytes);
                    let mut io = CommandIo::new(input.as_deref(), &mut sink);
                    (cmd.func)(&mut env, args, &mut io);
                }
                if pipe.overflowed {
                    say(
                        console,
                        format_args!("{}: output truncated to {} bytes\n", cmd.name, PIPE_CAPACITY),
                    );
                }
                input = Some(pipe.data);
            }

            if env.system.interrupted() {
                console.write_str("^C\n");
                *swallow_etx = true;
                return;
            }
        }

        if let Some(redirect) = pipeline.redirect {
            let data = input.unwrap_or_default();
            if let Err(err) = redirect_into(env.fs, env.cwd, redirect, &data) {
                say(console, format_args!("{}: {}\n", redirect.path(), err));
            }
        }
    }

    // ---------------------------------------------------------------------
    // Line editing
    // ---------------------------------------------------------------------

    fn submit(&mut self) {
        self.console.write_str("\n");
        let line = core::mem::take(&mut self.line);
        self.cursor = 0;
        self.browse = None;
        self.run_line(&line);
    }

    fn cancel_line(&mut self) {
        self.console.write_str("^C\n");
        self.line.clear();
        self.cursor = 0;
        self.browse = None;
        self.system.clear_interrupt();
        self.prompt();
    }

    /// Reprint from the cursor to the end of line, blank `erase` stale
    /// cells after it, then put the cursor back.
    fn redraw_tail(&mut self, erase: usize) {
        let tail = &self.line[self.cursor..];
        self.console.write_str(tail);
        for _ in 0..erase {
            self.console.write_str(" ");
        }
        self.console.cursor_left(tail.len() + erase);
    }

    fn insert(&mut self, c: char) {
        if self.line.len() >= LINE_BUF_LEN - 1 {
            return;
        }
        if self.cursor == self.line.len() {
            self.line.push(c);
            self.move_right();
            return;
        }
        self.line.insert(self.cursor, c);
        self.redraw_tail(0);
        self.move_right();
    }

    fn insert_str(&mut self, s: &str) {
        for c in s.chars().filter(|c| (' '..='~').contains(c)) {
            self.insert(c);
        }
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.console.cursor_left(1);
        self.line.remove(self.cursor);
        self.redraw_tail(1);
    }

    fn delete(&mut self) {
        if self.cursor == self.line.len() {
            return;
        }
        self.line.remove(self.cursor);
        self.redraw_tail(1);
    }

    fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.console.cursor_left(1);
        }
    }

    fn move_right(&mut self) {
        if self.cursor < self.line.len() {
            let c = &self.line[self.cursor..self.cursor + 1];
            self.console.write_str(c);
            self.cursor += 1;
        }
    }

    fn home(&mut self) {
        self.console.cursor_left(self.cursor);
        self.cursor = 0;
    }

    fn end(&mut self) {
        self.console.write_str(&self.line[self.cursor..]);
        self.cursor = self.line.len();
    }

    fn replace_line(&mut self, text: &str) {
        let old_len = self.line.len();
        self.home();
        self.line.clear();
        self.line.push_str(text);
        self.console.write_str(text);
        self.cursor = self.line.len();

        let stale = old_len.saturating_sub(text.len());
        for _ in 0..stale {
            self.console.write_str(" ");
        }
        self.console.cursor_left(stale);
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.browse {
            None => self.history.len() - 1,
            Some(0) => return,
            Some(i) => i - 1,
        };
        self.browse = Some(index);
        let text = String::from(self.history.get(index).unwrap_or_default());
        self.replace_line(&text);
    }

    fn history_next(&mut self) {
        let Some(index) = self.browse else {
            return;
        };
        if index + 1 < self.history.len() {
            self.browse = Some(index + 1);
            let text = String::from(self.history.get(index + 1).unwrap_or_default());
            self.replace_line(&text);
        } else {
            self.browse = None;
            self.replace_line("");
        }
    }

    // ---------------------------------------------------------------------
    // Tab completion
    // ---------------------------------------------------------------------

    fn complete(&mut self) {
        let before = &self.line[..self.cursor];
        let word_start = before
            .rfind(|c| matches!(c, ' ' | '|' | '>'))
            .map_or(0, |i| i + 1);
        let word = String::from(&before[word_start..]);
        let command_position = matches!(before[..word_start].trim_end().chars().last(), None | Some('|'));

        let (prefix, candidates) = if command_position {
            let names = COMMANDS
                .iter()
                .filter(|cmd| cmd.name.starts_with(word.as_str()))
                .map(|cmd| (String::from(cmd.name), false))
                .collect();
            (word.as_str(), names)
        } else {
            let (dir, prefix) = match word.rfind('/') {
                Some(i) => (&word[..=i], &word[i + 1..]),
                None => ("", word.as_str()),
            };
            (prefix, self.path_candidates(dir, prefix))
        };

        match candidates.as_slice() {
            [] => {}
            [(name, is_dir)] => {
                let rest = String::from(&name[prefix.len()..]);
                self.insert_str(&rest);
                self.insert(if *is_dir { '/' } else { ' ' });
            }
            [(first, _), others @ ..] => {
                let common = others.iter().fold(first.len(), |len, (name, _)| {
                    first
                        .bytes()
                        .zip(name.bytes())
                        .take(len)
                        .take_while(|(a, b)| a == b)
                        .count()
                });
                if common > prefix.len() {
                    let rest = String::from(&first[prefix.len()..common]);
                    self.insert_str(&rest);
                    return;
                }

                self.console.write_str("\n");
                for (i, (name, is_dir)) in candidates.iter().enumerate() {
                    if i > 0 {
                        self.console.write_str("  ");
                    }
                    self.console.write_str(name);
                    if *is_dir {
                        self.console.write_str("/");
                    }
                }
                self.console.write_str("\n");
                self.prompt();
                let line = core::mem::take(&mut self.line);
                self.console.write_str(&line);
                self.console.cursor_left(line.len() - self.cursor);
                self.line = line;
            }
        }
    }

    /// Entries of `dir` (relative to the cwd) whose names start with `prefix`.
    fn path_candidates(&mut self, dir: &str, prefix: &str) -> Vec<(String, bool)> {
        let mut found = Vec::new();
        if !self.fs.ready() {
            return found;
        }
        let Some(resolved) = resolve_path(&self.cwd, if dir.is_empty() { "." } else { dir }) else {
            return found;
        };
        if !matches!(self.fs.stat(&resolved), Ok(stat) if stat.is_dir) {
            return found;
        }
        let _ = self.fs.list(&resolved, |entry| {
            if entry.name().is_ascii() && entry.name().starts_with(prefix) {
                found.push((String::from(entry.name()), entry.is_dir));
            }
        });
        found
    }
}

fn redirect_into(
    fs: &mut LuxFs<Disk>,
    cwd: &str,
    redirect: Redirect<'_>,
    data: &[u8],
) -> Result<(), FsError> {
    let path = resolve_path(cwd, redirect.path()).ok_or(FsError::InvalidPath)?;
    fs.touch(&path)?;
    match redirect {
        Redirect::Truncate(_) => fs.write(&path, 0, data, true)?,
        Redirect::Append(_) => {
            let size = fs.stat(&path)?.size as usize;
            fs.write(&path, size, data, false)?
        }
    };
    Ok(())
}
