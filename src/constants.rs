/// System-wide constants to avoid magic numbers

/// VGA text mode constants
pub mod vga {
    /// VGA text buffer physical address
    pub const BUFFER_ADDR: usize = 0xb8000;

    /// VGA text mode dimensions
    pub const BUFFER_HEIGHT: usize = 25;
    pub const BUFFER_WIDTH: usize = 80;

    /// VGA control ports
    pub const COMMAND_PORT: u16 = 0x3D4;
    pub const DATA_PORT: u16 = 0x3D5;

    /// Cursor control registers
    pub const CURSOR_LOCATION_HIGH: u8 = 0x0E;
    pub const CURSOR_LOCATION_LOW: u8 = 0x0F;
}

/// PS/2 Keyboard controller constants
pub mod keyboard {
    /// PS/2 keyboard data port
    pub const DATA_PORT: u16 = 0x60;

    /// PS/2 keyboard status/command port
    pub const STATUS_COMMAND_PORT: u16 = 0x64;

    /// Status register bit flags
    pub const STATUS_OUTPUT_BUFFER_FULL: u8 = 0x01;

    /// Command to reset CPU via keyboard controller
    pub const CMD_RESET_CPU: u8 = 0xFE;

    /// Decoded events kept before the oldest one is dropped
    pub const EVENT_QUEUE_CAPACITY: usize = 64;
}

/// Interrupt constants
pub mod interrupts {
    /// PIC (Programmable Interrupt Controller) offset
    /// We remap PIC interrupts to start at 32 to avoid conflicts with CPU exceptions
    pub const PIC_1_OFFSET: u8 = 32;
    pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

    /// Master PIC data port (IRQ mask register)
    pub const PIC_1_DATA_PORT: u16 = 0x21;

    /// Software signal subscriptions held by the dispatcher
    pub const MAX_SIGNAL_HANDLERS: usize = 16;
}

/// Programmable Interval Timer
pub mod pit {
    pub const CHANNEL_0_PORT: u16 = 0x40;
    pub const COMMAND_PORT: u16 = 0x43;

    /// Channel 0, lo/hi byte access, mode 2 (rate generator), binary
    pub const CMD_CHANNEL_0_RATE_GENERATOR: u8 = 0x34;

    /// Input clock of the PIT in Hz
    pub const BASE_FREQUENCY: u32 = 1_193_182;

    /// One tick per millisecond
    pub const TICK_HZ: u32 = 1000;
}

/// Primary ATA bus, PIO mode
pub mod ata {
    pub const SECTOR_SIZE: usize = 512;

    pub const PRIMARY_IO: u16 = 0x1F0;
    pub const PRIMARY_CTRL: u16 = 0x3F6;

    pub const REG_DATA: u16 = PRIMARY_IO;
    pub const REG_FEATURES: u16 = PRIMARY_IO + 1;
    pub const REG_SECCOUNT: u16 = PRIMARY_IO + 2;
    pub const REG_LBA0: u16 = PRIMARY_IO + 3;
    pub const REG_LBA1: u16 = PRIMARY_IO + 4;
    pub const REG_LBA2: u16 = PRIMARY_IO + 5;
    pub const REG_DRIVE_SELECT: u16 = PRIMARY_IO + 6;
    pub const REG_COMMAND: u16 = PRIMARY_IO + 7;
    pub const REG_STATUS: u16 = PRIMARY_IO + 7;
    pub const REG_ALT_STATUS: u16 = PRIMARY_CTRL;
    pub const REG_CONTROL: u16 = PRIMARY_CTRL;

    pub const CMD_IDENTIFY: u8 = 0xEC;
    pub const CMD_READ_PIO: u8 = 0x20;
    pub const CMD_WRITE_PIO: u8 = 0x30;
    pub const CMD_CACHE_FLUSH: u8 = 0xE7;

    pub const STATUS_BSY: u8 = 0x80;
    pub const STATUS_DF: u8 = 0x20;
    pub const STATUS_DRQ: u8 = 0x08;
    pub const STATUS_ERR: u8 = 0x01;

    /// Disable device interrupts (nIEN)
    pub const CONTROL_NIEN: u8 = 0x02;

    /// Status polls before a command is considered hung
    pub const TIMEOUT_POLLS: u32 = 1_000_000;
}

/// LUXFS default geometry
pub mod luxfs {
    /// "LUXF"
    pub const MAGIC: u32 = 0x4C55_5846;
    pub const VERSION: u32 = 1;

    pub const START_LBA: u32 = 2048;
    pub const TOTAL_SECTORS: u32 = 4096;
    pub const MAX_INODES: u32 = 128;
    pub const DIRECT_BLOCKS: usize = 8;

    /// Hard file size ceiling: no indirect blocks exist
    pub const MAX_FILE_SIZE: usize = DIRECT_BLOCKS * super::ata::SECTOR_SIZE;

    pub const NAME_MAX: usize = 32;
    pub const MAX_PATH_DEPTH: usize = 8;
    pub const INVALID_BLOCK: u32 = 0xFFFF_FFFF;

    pub const SUPER_BLOCK: u32 = 0;
    pub const INODE_BITMAP_BLOCK: u32 = 1;
    pub const BLOCK_BITMAP_BLOCK: u32 = 2;
    pub const INODE_TABLE_START: u32 = 3;
}

/// Process table
pub mod process {
    pub const MAX_PROCESSES: usize = 16;
    pub const DEFAULT_STACK_SIZE: usize = 4096;
    pub const DEFAULT_PRIORITY: u8 = 128;

    /// RFLAGS with only the interrupt flag (and the reserved bit 1) set
    pub const INITIAL_RFLAGS: u64 = 0x202;
}

/// Interactive shell
pub mod shell {
    pub const LINE_BUF_LEN: usize = 128;
    pub const HISTORY_SIZE: usize = 16;
    pub const PATH_MAX: usize = 256;
    pub const PIPE_CAPACITY: usize = 4096;
    pub const MAX_ARGS: usize = 8;
    pub const MAX_STAGES: usize = 4;
    /// Bytes `cat` reads per filesystem call
    pub const CAT_CHUNK: usize = 512;
    pub const HEXDUMP_BYTES_PER_LINE: usize = 16;
    pub const HEXDUMP_DEFAULT_LEN: usize = 128;
    pub const HEXDUMP_MAX_LEN: usize = 512;
}

/// Kernel heap arena
pub mod heap {
    pub const HEAP_SIZE: usize = 1024 * 1024;

    /// Live allocations whose extents are kept for free-block statistics
    pub const MAX_TRACKED_ALLOCATIONS: usize = 1024;
}

/// Serial port used as the log sink
pub mod serial {
    pub const COM1: u16 = 0x3F8;
}
