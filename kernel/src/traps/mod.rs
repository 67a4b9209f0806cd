//! Interrupt and trap handling: the fault sentinel, legacy IRQ dispatch,
//! the IDT/GDT/TSS that wire them in, and the pre-STI safety harness run
//! just before the kernel unmasks interrupts.

mod fault_sentinel;
mod idt;
mod irq;
pub mod pre_sti;

pub use idt::init;
pub use irq::{irq_register, IRQ_BASE_VECTOR};

/// Trigger a breakpoint exception for testing.
#[inline]
pub fn trigger_breakpoint() {
    unsafe {
        core::arch::asm!("int3");
    }
}
