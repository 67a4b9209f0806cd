//! Legacy 8259 PIC (Programmable Interrupt Controller) driver.
//!
//! The 8259 PIC is this kernel's interrupt controller: IRQ 0-7 overlap with
//! CPU exception vectors 0-7 by default, so it must be remapped before
//! interrupts are ever enabled. After remap, individual IRQ lines are
//! masked/unmasked as their handlers come online, and `eoi()` acknowledges
//! each interrupt once its handler has run.

use crate::port::{inb, outb};

/// I/O port addresses for the master PIC.
const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;

/// I/O port addresses for the slave PIC.
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// Non-specific End-Of-Interrupt command.
const CMD_EOI: u8 = 0x20;

/// ICW1: Initialization Command Word 1 - begin initialization sequence.
const ICW1_INIT: u8 = 0x10;
/// ICW1: ICW4 will be sent.
const ICW1_ICW4: u8 = 0x01;
/// ICW4: 8086/88 mode (as opposed to MCS-80/85 mode).
const ICW4_8086: u8 = 0x01;

/// Remap offset for PIC1 (IRQ 0-7 → vectors 32-39).
const PIC1_OFFSET: u8 = 32;
/// Remap offset for PIC2 (IRQ 8-15 → vectors 40-47).
const PIC2_OFFSET: u8 = 40;

/// Small I/O delay by writing to an unused port.
/// Some old hardware requires a delay between PIC commands.
#[inline]
fn io_wait() {
    unsafe {
        outb(0x80, 0);
    }
}

/// Remap the 8259 PIC interrupt vectors (IRQ0-7 -> 32-39, IRQ8-15 -> 40-47)
/// and mask every line. Individual IRQs are unmasked later, under
/// controlled conditions, by `unmask_irq`.
pub fn init() {
    unsafe {
        // ICW1: Begin initialization (cascade mode, ICW4 needed)
        outb(PIC1_COMMAND, ICW1_INIT | ICW1_ICW4);
        io_wait();
        outb(PIC2_COMMAND, ICW1_INIT | ICW1_ICW4);
        io_wait();

        // ICW2: Set vector offsets
        outb(PIC1_DATA, PIC1_OFFSET);
        io_wait();
        outb(PIC2_DATA, PIC2_OFFSET);
        io_wait();

        // ICW3: Tell master PIC there is a slave PIC at IRQ2 (bit 2)
        outb(PIC1_DATA, 4);
        io_wait();
        // ICW3: Tell slave PIC its cascade identity (IRQ2 = 2)
        outb(PIC2_DATA, 2);
        io_wait();

        // ICW4: Set 8086 mode
        outb(PIC1_DATA, ICW4_8086);
        io_wait();
        outb(PIC2_DATA, ICW4_8086);
        io_wait();

        // Mask ALL IRQs on both PICs (0xFF = all bits set = all masked)
        outb(PIC1_DATA, 0xFF);
        outb(PIC2_DATA, 0xFF);
    }
}

/// Read both PIC interrupt mask registers, master first.
pub fn read_masks() -> (u8, u8) {
    unsafe { (inb(PIC1_DATA), inb(PIC2_DATA)) }
}

/// Unmask (enable) one legacy IRQ line, 0-15.
pub fn unmask_irq(irq: u8) {
    unsafe {
        let port = if irq < 8 { PIC1_DATA } else { PIC2_DATA };
        let bit = if irq < 8 { irq } else { irq - 8 };
        let mask = inb(port) & !(1 << bit);
        outb(port, mask);
    }
}

/// Mask (disable) one legacy IRQ line, 0-15.
pub fn mask_irq(irq: u8) {
    unsafe {
        let port = if irq < 8 { PIC1_DATA } else { PIC2_DATA };
        let bit = if irq < 8 { irq } else { irq - 8 };
        let mask = inb(port) | (1 << bit);
        outb(port, mask);
    }
}

/// Acknowledge IRQ `n` (0-15). Slave-originated IRQs (n >= 8) need EOI sent
/// to both controllers; master-originated IRQs need it sent to PIC1 only.
pub fn eoi(irq: u8) {
    unsafe {
        if irq >= 8 {
            outb(PIC2_COMMAND, CMD_EOI);
        }
        outb(PIC1_COMMAND, CMD_EOI);
    }
}
