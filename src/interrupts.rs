use lazy_static::lazy_static;
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use crate::constants::interrupts::{PIC_1_DATA_PORT, PIC_1_OFFSET, PIC_2_OFFSET};
use crate::println;

/// Hardware interrupt numbers (after remapping)
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard,
    // PIC 1 (master) IRQs 2-7
    Cascade,
    COM2,
    COM1,
    LPT2,
    FloppyDisk,
    LPT1,
    // PIC 2 (slave) IRQs 8-15
    RTC = PIC_2_OFFSET,
    ACPI,
    Available1,
    Available2,
    Mouse,
    CoProcessor,
    PrimaryATA,
    SecondaryATA,
}

impl InterruptIndex {
    fn as_u8(self) -> u8 {
        self as u8
    }

    fn irq(self) -> u8 {
        self.as_u8() - PIC_1_OFFSET
    }
}

/// Programmable Interrupt Controller (PIC) setup
pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        // CPU exceptions
        idt.breakpoint.set_handler_fn(breakpoint_handler);

        // Double fault handler with separate stack (IST)
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(crate::gdt::DOUBLE_FAULT_IST_INDEX);
        }

        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);

        idt[InterruptIndex::Timer.as_u8()].set_handler_fn(timer_interrupt_handler);
        idt[InterruptIndex::Keyboard.as_u8()].set_handler_fn(keyboard_interrupt_handler);

        // Every other PIC line gets a handler so a stray IRQ cannot triple fault
        for index in [
            InterruptIndex::Cascade,
            InterruptIndex::COM2,
            InterruptIndex::COM1,
            InterruptIndex::LPT2,
            InterruptIndex::FloppyDisk,
            InterruptIndex::LPT1,
        ] {
            idt[index.as_u8()].set_handler_fn(spurious_master_handler);
        }
        for index in [
            InterruptIndex::RTC,
            InterruptIndex::ACPI,
            InterruptIndex::Available1,
            InterruptIndex::Available2,
            InterruptIndex::Mouse,
            InterruptIndex::CoProcessor,
            InterruptIndex::PrimaryATA,
            InterruptIndex::SecondaryATA,
        ] {
            idt[index.as_u8()].set_handler_fn(spurious_slave_handler);
        }

        idt
    };
}

/// Load the IDT, remap the PICs and unmask the timer and keyboard lines.
///
/// Interrupts stay disabled; call [`enable`] once the rest of the kernel
/// is ready for them.
pub fn init() {
    IDT.load();

    unsafe {
        PICS.lock().initialize();

        let mut pic1_data: Port<u8> = Port::new(PIC_1_DATA_PORT);
        let mask = pic1_data.read();
        let unmask = (1 << InterruptIndex::Timer.irq()) | (1 << InterruptIndex::Keyboard.irq());
        pic1_data.write(mask & !unmask);
    }
    log::info!("interrupts: IDT loaded, IRQ0 and IRQ1 unmasked");
}

pub fn enable() {
    x86_64::instructions::interrupts::enable();
}

// Exception handlers
extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    println!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
    crate::hlt_loop();
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    println!("EXCEPTION: PAGE FAULT");
    println!("Accessed Address: {:?}", Cr2::read());
    println!("Error Code: {:?}", error_code);
    println!("{:#?}", stack_frame);
    crate::hlt_loop();
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    println!("EXCEPTION: GENERAL PROTECTION FAULT");
    println!("Error Code: {}", error_code);
    println!("{:#?}", stack_frame);
    crate::hlt_loop();
}

// Hardware interrupt handlers
extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let now = crate::timer::on_interrupt();

    // Must precede on_tick, which may switch away
    unsafe {
        PICS.lock()
            .notify_end_of_interrupt(InterruptIndex::Timer.as_u8());
    }

    crate::process::on_tick(now);
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    crate::keyboard::on_interrupt();

    unsafe {
        PICS.lock()
            .notify_end_of_interrupt(InterruptIndex::Keyboard.as_u8());
    }
}

extern "x86-interrupt" fn spurious_master_handler(_stack_frame: InterruptStackFrame) {
    unsafe {
        PICS.lock()
            .notify_end_of_interrupt(InterruptIndex::Cascade.as_u8());
    }
}

extern "x86-interrupt" fn spurious_slave_handler(_stack_frame: InterruptStackFrame) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(PIC_2_OFFSET);
    }
}
