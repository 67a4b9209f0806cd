//! Event core: the `EventRecord` value, the bounded posting queue, and
//! the 60 Hz tick count the classic event loop is built around.
//!
//! Grounded in `original_source`'s `EventManager.c`/`EventQueue.c` shape:
//! a fixed-size ring buffer fed by IRQ handlers and main-line code,
//! drained by `GetNextEvent`/`WaitNextEvent`. The 1 kHz PIT interrupt
//! increments a raw tick counter (`pal::timer_ticks`); `tick_count()`
//! divides by 16 to approximate the original 60 Hz convention.

pub mod queue;

use crate::geom::Point;
use crate::pal;

/// `TickCount()`: 60 Hz ticks since boot, derived from the platform's
/// 1 kHz timer tick (`pal::timer_ticks()`, incremented by the IRQ0
/// handler) by dividing by 16 (nearest), per spec convention.
#[inline]
pub fn tick_count() -> u32 {
    ((pal::timer_ticks() + 8) / 16) as u32
}

pub type Ticks = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventKind {
    Null = 0,
    MouseDown = 1,
    MouseUp = 2,
    KeyDown = 3,
    KeyUp = 4,
    AutoKey = 5,
    UpdateEvt = 6,
    DiskEvt = 7,
    ActivateEvt = 8,
    OsEvt = 9,
}

bitflags::bitflags! {
    /// Modifier bits carried in `EventRecord::modifiers`. Bit layout
    /// mirrors the classic `modifiers` word; `ACTIVE` is only meaningful
    /// on `activateEvt` (toggles the window's hilite state).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modifiers: u16 {
        const ACTIVE   = 0x0001;
        const SHIFT    = 0x0200;
        const CAPS_LOCK = 0x0400;
        const OPTION   = 0x0800;
        const COMMAND  = 0x1000;
        const CONTROL  = 0x2000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub what: EventKind,
    pub message: u32,
    pub when: Ticks,
    pub where_: Point,
    pub modifiers: Modifiers,
}

impl EventRecord {
    pub fn null_at(where_: Point) -> Self {
        Self {
            what: EventKind::Null,
            message: 0,
            when: tick_count(),
            where_,
            modifiers: Modifiers::empty(),
        }
    }

    /// Mouse events carry click count in the high 16 bits, part code in
    /// the low 16 bits of `message`.
    pub fn click_count(&self) -> u16 {
        (self.message >> 16) as u16
    }

    pub fn part_code(&self) -> u16 {
        self.message as u16
    }
}
