//! PS/2 keyboard: scancode decoding, modifier state and the event queue.
//!
//! Scancodes reach [`KeyboardDriver::process_scancode`] either from the IRQ1
//! handler or from the port-polling loop; both feed the same decoder, so
//! the queued events are identical whichever path delivered them.

use bitflags::bitflags;
use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::constants::keyboard::EVENT_QUEUE_CAPACITY;
use crate::signal::{self, Signal};

/// Sentinel symbols for keys without a printable character.
pub mod keys {
    pub const ARROW_UP: char = '\u{80}';
    pub const ARROW_DOWN: char = '\u{81}';
    pub const ARROW_LEFT: char = '\u{82}';
    pub const ARROW_RIGHT: char = '\u{83}';
    pub const DELETE: char = '\u{84}';
    pub const HOME: char = '\u{85}';
    pub const END: char = '\u{86}';

    /// Ctrl-C as produced by the Ctrl letter mapping
    pub const ETX: char = '\u{3}';
    pub const BACKSPACE: char = '\u{8}';
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0x01;
        const CTRL = 0x02;
        const ALTGR = 0x04;
        const CAPSLOCK = 0x08;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub symbol: char,
    pub modifiers: Modifiers,
    /// Releases are never queued, so this is always true today.
    pub pressed: bool,
}

impl KeyEvent {
    const EMPTY: KeyEvent = KeyEvent {
        symbol: '\0',
        modifiers: Modifiers::empty(),
        pressed: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Us,
    German,
}

impl Layout {
    pub fn name(self) -> &'static str {
        match self {
            Layout::Us => "us",
            Layout::German => "de",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "us" => Some(Layout::Us),
            "de" => Some(Layout::German),
            _ => None,
        }
    }

    fn decoder_layout(self) -> layouts::AnyLayout {
        match self {
            Layout::Us => layouts::AnyLayout::Us104Key(layouts::Us104Key),
            Layout::German => layouts::AnyLayout::De105Key(layouts::De105Key),
        }
    }
}

/// Fixed ring of decoded events; a full queue drops its oldest entry.
pub struct EventQueue {
    buffer: [KeyEvent; EVENT_QUEUE_CAPACITY],
    head: usize,
    len: usize,
}

impl EventQueue {
    pub const fn new() -> Self {
        EventQueue {
            buffer: [KeyEvent::EMPTY; EVENT_QUEUE_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, event: KeyEvent) {
        if self.len == EVENT_QUEUE_CAPACITY {
            log::trace!("keyboard: queue full, dropping oldest event");
            self.head = (self.head + 1) % EVENT_QUEUE_CAPACITY;
            self.len -= 1;
        }
        let tail = (self.head + self.len) % EVENT_QUEUE_CAPACITY;
        self.buffer[tail] = event;
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<KeyEvent> {
        if self.len == 0 {
            return None;
        }
        let event = self.buffer[self.head];
        self.head = (self.head + 1) % EVENT_QUEUE_CAPACITY;
        self.len -= 1;
        Some(event)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyboardDriver {
    decoder: Keyboard<layouts::AnyLayout, ScancodeSet1>,
    layout: Layout,
    queue: EventQueue,
    on_ctrl_c: fn(Signal),
}

impl KeyboardDriver {
    pub fn new(layout: Layout) -> Self {
        Self::with_signal_hook(layout, signal::raise)
    }

    /// `raise` is called with `Signal::CtrlC` whenever ETX is queued.
    pub fn with_signal_hook(layout: Layout, raise: fn(Signal)) -> Self {
        KeyboardDriver {
            decoder: Self::decoder(layout),
            layout,
            queue: EventQueue::new(),
            on_ctrl_c: raise,
        }
    }

    fn decoder(layout: Layout) -> Keyboard<layouts::AnyLayout, ScancodeSet1> {
        Keyboard::new(
            ScancodeSet1::new(),
            layout.decoder_layout(),
            HandleControl::Ignore,
        )
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Switch layouts. Latched modifier state is reset.
    pub fn set_layout(&mut self, layout: Layout) {
        self.decoder = Self::decoder(layout);
        self.layout = layout;
        log::info!("keyboard: layout {}", layout.name());
    }

    pub fn modifiers(&self) -> Modifiers {
        let state = self.decoder.get_modifiers();
        let mut mods = Modifiers::empty();
        mods.set(Modifiers::SHIFT, state.is_shifted());
        mods.set(Modifiers::CTRL, state.is_ctrl());
        mods.set(Modifiers::ALTGR, state.is_altgr());
        mods.set(Modifiers::CAPSLOCK, state.capslock);
        mods
    }

    /// Feed one raw scancode. Returns the event it completed, if any, after
    /// queueing it.
    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        let raw = match self.decoder.add_byte(scancode) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                log::trace!("keyboard: bad scancode {:#04x}: {:?}", scancode, err);
                return None;
            }
        };
        let modifiers = self.modifiers();
        let symbol = match self.decoder.process_keyevent(raw)? {
            DecodedKey::Unicode('\u{7f}') => keys::DELETE,
            DecodedKey::Unicode(c) if modifiers.contains(Modifiers::CTRL) => control_code(c),
            DecodedKey::Unicode(c) => c,
            DecodedKey::RawKey(code) => special_symbol(code)?,
        };

        let event = KeyEvent {
            symbol,
            modifiers,
            pressed: true,
        };
        self.queue.push(event);
        if symbol == keys::ETX {
            (self.on_ctrl_c)(Signal::CtrlC);
        }
        Some(event)
    }

    pub fn poll_event(&mut self) -> Option<KeyEvent> {
        self.queue.pop()
    }

    pub fn poll_char(&mut self) -> Option<char> {
        self.poll_event().map(|event| event.symbol)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Ctrl plus the letter the layout produced gives codes 1 to 26.
fn control_code(c: char) -> char {
    if c.is_ascii_alphabetic() {
        char::from(c.to_ascii_lowercase() as u8 - b'a' + 1)
    } else {
        c
    }
}

fn special_symbol(code: KeyCode) -> Option<char> {
    match code {
        KeyCode::ArrowUp => Some(keys::ARROW_UP),
        KeyCode::ArrowDown => Some(keys::ARROW_DOWN),
        KeyCode::ArrowLeft => Some(keys::ARROW_LEFT),
        KeyCode::ArrowRight => Some(keys::ARROW_RIGHT),
        KeyCode::Delete => Some(keys::DELETE),
        KeyCode::Home => Some(keys::HOME),
        KeyCode::End => Some(keys::END),
        _ => None,
    }
}

lazy_static! {
    pub static ref KEYBOARD: Mutex<KeyboardDriver> = Mutex::new(KeyboardDriver::new(Layout::German));
}

pub fn poll_event() -> Option<KeyEvent> {
    crate::without_interrupts(|| KEYBOARD.lock().poll_event())
}

pub fn set_layout(layout: Layout) {
    crate::without_interrupts(|| KEYBOARD.lock().set_layout(layout));
}

pub fn layout() -> Layout {
    crate::without_interrupts(|| KEYBOARD.lock().layout())
}

pub fn modifiers() -> Modifiers {
    crate::without_interrupts(|| KEYBOARD.lock().modifiers())
}

#[cfg(target_os = "none")]
pub use ports::*;

#[cfg(target_os = "none")]
mod ports {
    use x86_64::instructions::hlt;
    use x86_64::instructions::port::Port;

    use super::*;
    use crate::constants::keyboard::{
        CMD_RESET_CPU, DATA_PORT, STATUS_COMMAND_PORT, STATUS_OUTPUT_BUFFER_FULL,
    };

    fn read_pending_scancode() -> Option<u8> {
        let mut status = Port::<u8>::new(STATUS_COMMAND_PORT);
        let mut data = Port::<u8>::new(DATA_PORT);
        unsafe {
            if status.read() & STATUS_OUTPUT_BUFFER_FULL == 0 {
                return None;
            }
            Some(data.read())
        }
    }

    /// Polling path: drain the controller's output buffer.
    pub fn poll() {
        crate::without_interrupts(|| {
            let mut driver = KEYBOARD.lock();
            while let Some(scancode) = read_pending_scancode() {
                driver.process_scancode(scancode);
            }
        });
    }

    /// IRQ path: interrupts are already off.
    pub fn on_interrupt() {
        if let Some(scancode) = read_pending_scancode() {
            KEYBOARD.lock().process_scancode(scancode);
        }
    }

    /// Block until a key event is available.
    pub fn read_event() -> KeyEvent {
        loop {
            if let Some(event) = poll_event() {
                return event;
            }
            poll();
            if crate::without_interrupts(|| KEYBOARD.lock().pending()) == 0 {
                hlt();
            }
        }
    }

    pub fn read_char() -> char {
        read_event().symbol
    }

    pub fn poll_char() -> Option<char> {
        poll_event().map(|event| event.symbol)
    }

    /// Pulse the reset line through the keyboard controller.
    pub fn reset_cpu() -> ! {
        unsafe {
            let mut port = Port::<u8>::new(STATUS_COMMAND_PORT);
            port.write(CMD_RESET_CPU);
        }

        loop {
            hlt();
        }
    }
}
