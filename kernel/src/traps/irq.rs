//! IRQ dispatch for the legacy vector range (0x20-0x2F).
//!
//! One stub per IRQ line acknowledges the PIC (EOI to master always, slave
//! too for n >= 8) and then calls whatever handler is registered for that
//! line; an unregistered line is silently EOI'd. Handler contract (spec
//! §4.2): must not block, must not allocate, should post an event rather
//! than process it inline.

use spin::Mutex;
use x86_64::structures::idt::InterruptStackFrame;

pub const IRQ_BASE_VECTOR: u8 = 32;

type IrqHandler = fn();

static HANDLERS: Mutex<[Option<IrqHandler>; 16]> = Mutex::new([None; 16]);

/// Register `handler` to run on every IRQ `n` (0-15). Overwrites any
/// previous registration for that line.
pub fn irq_register(n: u8, handler: IrqHandler) {
    HANDLERS.lock()[n as usize] = Some(handler);
}

fn dispatch(irq: u8) {
    let handler = HANDLERS.lock()[irq as usize];
    if let Some(f) = handler {
        f();
    }
    khal::pic::eoi(irq);
}

macro_rules! irq_stub {
    ($fn_name:ident, $irq:expr) => {
        pub extern "x86-interrupt" fn $fn_name(_frame: InterruptStackFrame) {
            dispatch($irq);
        }
    };
}

irq_stub!(irq0, 0); // PIT / timer tick
irq_stub!(irq1, 1); // PS/2 keyboard
irq_stub!(irq2, 2); // cascade (never fires directly)
irq_stub!(irq3, 3);
irq_stub!(irq4, 4);
irq_stub!(irq5, 5);
irq_stub!(irq6, 6);
irq_stub!(irq7, 7);
irq_stub!(irq8, 8); // RTC
irq_stub!(irq9, 9);
irq_stub!(irq10, 10);
irq_stub!(irq11, 11);
irq_stub!(irq12, 12); // PS/2 mouse
irq_stub!(irq13, 13);
irq_stub!(irq14, 14); // ATA primary
irq_stub!(irq15, 15); // ATA secondary
