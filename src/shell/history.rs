use alloc::collections::VecDeque;
use alloc::string::String;

use crate::constants::shell::HISTORY_SIZE;

/// The last `HISTORY_SIZE` submitted lines, oldest first.
#[derive(Debug, Default)]
pub struct History {
    lines: VecDeque<String>,
}

impl History {
    pub fn new() -> Self {
        History {
            lines: VecDeque::with_capacity(HISTORY_SIZE),
        }
    }

    /// Blank lines are not recorded.
    pub fn push(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        if self.lines.len() == HISTORY_SIZE {
            self.lines.pop_front();
        }
        self.lines.push_back(String::from(line));
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}
