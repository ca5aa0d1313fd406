//! Software signal fan-out.
//!
//! Producers (the keyboard driver on Ctrl-C) call [`raise`]; consumers
//! subscribe a plain function plus a context word. Handlers run
//! synchronously, in table order, outside the table lock, and must not
//! block.

use core::fmt;

use spin::Mutex;

use crate::constants::interrupts::MAX_SIGNAL_HANDLERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    CtrlC,
}

pub type Handler = fn(Signal, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    TableFull,
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::TableFull => f.write_str("signal table full"),
        }
    }
}

#[derive(Clone, Copy)]
struct Subscription {
    signal: Signal,
    handler: Handler,
    context: usize,
}

#[derive(Clone, Copy)]
pub struct Dispatcher {
    slots: [Option<Subscription>; MAX_SIGNAL_HANDLERS],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub const fn new() -> Self {
        Dispatcher {
            slots: [None; MAX_SIGNAL_HANDLERS],
        }
    }

    /// Returns the slot id to pass to `unsubscribe`.
    pub fn subscribe(
        &mut self,
        signal: Signal,
        handler: Handler,
        context: usize,
    ) -> Result<usize, SignalError> {
        let id = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SignalError::TableFull)?;
        self.slots[id] = Some(Subscription {
            signal,
            handler,
            context,
        });
        Ok(id)
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: usize) -> bool {
        match self.slots.get_mut(id) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn raise(&self, signal: Signal) {
        for sub in self.slots.iter().flatten() {
            if sub.signal == signal {
                (sub.handler)(signal, sub.context);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub static SIGNALS: Mutex<Dispatcher> = Mutex::new(Dispatcher::new());

pub fn subscribe(signal: Signal, handler: Handler, context: usize) -> Result<usize, SignalError> {
    crate::without_interrupts(|| SIGNALS.lock().subscribe(signal, handler, context))
}

pub fn unsubscribe(id: usize) -> bool {
    crate::without_interrupts(|| SIGNALS.lock().unsubscribe(id))
}

/// Deliver `signal` to every subscriber of the global table.
///
/// The table is copied first so handlers may (un)subscribe.
pub fn raise(signal: Signal) {
    let table = match SIGNALS.try_lock() {
        Some(table) => *table,
        None => {
            log::warn!("signal: table busy, dropped {:?}", signal);
            return;
        }
    };
    table.raise(signal);
}
