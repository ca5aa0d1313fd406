use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;
use volatile::Volatile;
use x86_64::instructions::port::Port;

use crate::constants::vga::{
    BUFFER_ADDR, BUFFER_HEIGHT, BUFFER_WIDTH, COMMAND_PORT, CURSOR_LOCATION_HIGH,
    CURSOR_LOCATION_LOW, DATA_PORT,
};
use crate::shell::Console;

#[allow(dead_code)]
#[derive(Clone, Copy)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: ColorCode,
}

#[repr(transparent)]
struct Buffer {
    chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

pub struct Writer {
    column_position: usize,
    row_position: usize,
    color_code: ColorCode,
    buffer: &'static mut Buffer,
}

impl Writer {
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.column_position = 0,
            _ => {
                if self.column_position >= BUFFER_WIDTH {
                    self.new_line();
                }
                let row = self.row_position;
                let col = self.column_position;
                self.buffer.chars[row][col].write(ScreenChar {
                    ascii_character: byte,
                    color_code: self.color_code,
                });
                self.column_position += 1;
            }
        }
    }

    fn new_line(&mut self) {
        if self.row_position < BUFFER_HEIGHT - 1 {
            self.row_position += 1;
        } else {
            // Scroll: move everything up
            for row in 1..BUFFER_HEIGHT {
                for col in 0..BUFFER_WIDTH {
                    let character = self.buffer.chars[row][col].read();
                    self.buffer.chars[row - 1][col].write(character);
                }
            }
            self.clear_row(BUFFER_HEIGHT - 1);
        }
        self.column_position = 0;
    }

    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code,
        };
        for col in 0..BUFFER_WIDTH {
            self.buffer.chars[row][col].write(blank);
        }
    }

    /// Printable ASCII and newline pass through, anything else shows as a block.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            match byte {
                0x20..=0x7e | b'\n' => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }
        self.update_cursor();
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Step back `n` cells, wrapping onto earlier rows. Nothing is erased.
    pub fn cursor_left(&mut self, n: usize) {
        let pos = self.row_position * BUFFER_WIDTH + self.column_position;
        let pos = pos.saturating_sub(n);
        self.row_position = pos / BUFFER_WIDTH;
        self.column_position = pos % BUFFER_WIDTH;
        self.update_cursor();
    }

    pub fn set_color(&mut self, color_code: ColorCode) {
        self.color_code = color_code;
    }

    pub fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.column_position = 0;
        self.row_position = 0;
        self.update_cursor();
    }

    fn update_cursor(&mut self) {
        let col = self.column_position.min(BUFFER_WIDTH - 1);
        let pos = (self.row_position * BUFFER_WIDTH + col) as u16;
        let mut command = Port::<u8>::new(COMMAND_PORT);
        let mut data = Port::<u8>::new(DATA_PORT);
        unsafe {
            command.write(CURSOR_LOCATION_HIGH);
            data.write((pos >> 8) as u8);
            command.write(CURSOR_LOCATION_LOW);
            data.write((pos & 0xFF) as u8);
        }
    }
}

lazy_static! {
    pub static ref WRITER: Mutex<Writer> = Mutex::new(Writer {
        column_position: 0,
        row_position: 0,
        color_code: ColorCode::new(Color::White, Color::Black),
        buffer: unsafe { &mut *(BUFFER_ADDR as *mut Buffer) },
    });
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::vga_buffer::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    crate::without_interrupts(|| {
        let _ = WRITER.lock().write_fmt(args);
    });
}

pub fn clear_screen() {
    crate::without_interrupts(|| WRITER.lock().clear_screen());
}

/// The VGA text screen as the shell's console.
pub struct VgaConsole;

impl Console for VgaConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        crate::without_interrupts(|| WRITER.lock().write_bytes(bytes));
    }

    fn cursor_left(&mut self, n: usize) {
        crate::without_interrupts(|| WRITER.lock().cursor_left(n));
    }
}
