//! Intel 8253/8254 Programmable Interval Timer.
//!
//! The PIT is the legacy periodic timer source. Channel 0 is wired to IRQ0
//! and is programmed here for square-wave mode at a fixed rate; the common
//! rate used throughout the kernel is 1 kHz (1000 ticks/second), which
//! `TickCount()` (60 Hz) is derived from by dividing by 16 (nearest).

use crate::port::outb;

const CHANNEL0_DATA: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Base input frequency of the PIT oscillator, in Hz.
const PIT_FREQUENCY_HZ: u32 = 1_193_182;

/// Channel 0, access lobyte/hibyte, mode 3 (square wave), binary mode.
const CMD_CHANNEL0_MODE3: u8 = 0b00_11_011_0;

/// Program channel 0 for a periodic interrupt at `hz`, rounding the divisor
/// to the nearest integer. `hz` must divide evenly enough that the rounded
/// reload value is nonzero (anything up to ~1.19 MHz works; the kernel only
/// ever asks for 1000 Hz).
pub fn set_frequency(hz: u32) {
    let divisor = (PIT_FREQUENCY_HZ + hz / 2) / hz;
    let divisor = divisor.clamp(1, 0xFFFF) as u16;
    unsafe {
        outb(COMMAND, CMD_CHANNEL0_MODE3);
        outb(CHANNEL0_DATA, (divisor & 0xFF) as u8);
        outb(CHANNEL0_DATA, (divisor >> 8) as u8);
    }
}
