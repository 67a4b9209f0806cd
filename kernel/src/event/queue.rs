//! The bounded event queue: `post_event`/`get_next_event`/
//! `wait_next_event`, multi-click detection, and the modal-tracking
//! guard. Mutated under `irq_disable` on both producer and consumer
//! sides (spec §5's "Global mutable event queue" design note) — no
//! locks, a plain index-based ring buffer guarded by disabling
//! interrupts for the duration of the push/pop.

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use super::{tick_count, EventKind, EventRecord, Modifiers, Ticks};
use crate::geom::Point;
use crate::pal;

const QUEUE_CAPACITY: usize = 32;

/// `mouseDown`s within this many ticks of the previous click, and
/// within `CLICK_SLOP` pixels, continue a multi-click run.
const DOUBLE_CLICK_THRESHOLD: Ticks = 30;
const CLICK_SLOP: i16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u16 {
        const NULL      = 1 << 0;
        const MOUSE_DOWN = 1 << 1;
        const MOUSE_UP   = 1 << 2;
        const KEY_DOWN   = 1 << 3;
        const KEY_UP     = 1 << 4;
        const AUTO_KEY   = 1 << 5;
        const UPDATE     = 1 << 6;
        const DISK       = 1 << 7;
        const ACTIVATE   = 1 << 8;
        const OS         = 1 << 9;
        const ALL        = 0x03FF;
    }
}

fn mask_of(what: EventKind) -> EventMask {
    match what {
        EventKind::Null => EventMask::NULL,
        EventKind::MouseDown => EventMask::MOUSE_DOWN,
        EventKind::MouseUp => EventMask::MOUSE_UP,
        EventKind::KeyDown => EventMask::KEY_DOWN,
        EventKind::KeyUp => EventMask::KEY_UP,
        EventKind::AutoKey => EventMask::AUTO_KEY,
        EventKind::UpdateEvt => EventMask::UPDATE,
        EventKind::DiskEvt => EventMask::DISK,
        EventKind::ActivateEvt => EventMask::ACTIVATE,
        EventKind::OsEvt => EventMask::OS,
    }
}

struct Ring {
    buf: [Option<EventRecord>; QUEUE_CAPACITY],
    head: usize,
    len: usize,
}

impl Ring {
    const fn new() -> Self {
        Self { buf: [None; QUEUE_CAPACITY], head: 0, len: 0 }
    }

    fn push(&mut self, rec: EventRecord) -> Result<(), QueueFull> {
        if self.len == QUEUE_CAPACITY {
            return Err(QueueFull);
        }
        let tail = (self.head + self.len) % QUEUE_CAPACITY;
        self.buf[tail] = Some(rec);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest record matching `mask`, leaving
    /// every other record's relative order unchanged.
    fn take_matching(&mut self, mask: EventMask) -> Option<EventRecord> {
        for i in 0..self.len {
            let idx = (self.head + i) % QUEUE_CAPACITY;
            if let Some(rec) = self.buf[idx] {
                if mask.contains(mask_of(rec.what)) {
                    for j in i..self.len - 1 {
                        let a = (self.head + j) % QUEUE_CAPACITY;
                        let b = (self.head + j + 1) % QUEUE_CAPACITY;
                        self.buf[a] = self.buf[b];
                    }
                    let last = (self.head + self.len - 1) % QUEUE_CAPACITY;
                    self.buf[last] = None;
                    self.len -= 1;
                    return Some(rec);
                }
            }
        }
        None
    }
}

static QUEUE: Mutex<Ring> = Mutex::new(Ring::new());
static LAST_MOUSE: Mutex<Point> = Mutex::new(Point::new(0, 0));
static IN_MOUSE_TRACKING: AtomicBool = AtomicBool::new(false);

struct MultiClickState {
    last_tick: Ticks,
    last_where: Point,
    count: u16,
}

static MULTI_CLICK: Mutex<MultiClickState> =
    Mutex::new(MultiClickState { last_tick: 0, last_where: Point::new(0, 0), count: 0 });

/// Pure multi-click decision: given the previous click's tick/position/
/// count and a new click's tick/position, returns the run's new count
/// (spec §4.7 — within `DOUBLE_CLICK_THRESHOLD` ticks and `CLICK_SLOP`
/// pixels of the last click continues the run, capped at 3; otherwise
/// the run restarts at 1).
fn next_click_count(prev: &MultiClickState, now: Ticks, where_: Point) -> u16 {
    let dt = now.wrapping_sub(prev.last_tick);
    let dx = (where_.h - prev.last_where.h).unsigned_abs();
    let dy = (where_.v - prev.last_where.v).unsigned_abs();
    if dt <= DOUBLE_CLICK_THRESHOLD && dx <= CLICK_SLOP as u16 && dy <= CLICK_SLOP as u16 {
        (prev.count + 1).min(3)
    } else {
        1
    }
}

/// Run `body` with interrupts disabled, matching the spec's
/// `irq_disable`-guarded producer/consumer critical section.
fn with_irqs_disabled<R>(body: impl FnOnce() -> R) -> R {
    let flags = pal::irq_disable();
    let r = body();
    pal::irq_restore(flags);
    r
}

/// Record the latest known mouse position, used for synthetic null
/// events and as the `where` field of subsequently posted events.
pub fn set_mouse_position(p: Point) {
    *LAST_MOUSE.lock() = p;
}

pub fn mouse_position() -> Point {
    *LAST_MOUSE.lock()
}

/// Set or clear the modal-tracking guard. While set, `post_mouse_down`
/// and `post_mouse_up` are suppressed (spec §4.7).
pub fn set_mouse_tracking(tracking: bool) {
    IN_MOUSE_TRACKING.store(tracking, Ordering::SeqCst);
}

pub fn is_mouse_tracking() -> bool {
    IN_MOUSE_TRACKING.load(Ordering::SeqCst)
}

fn post_raw(what: EventKind, message: u32, where_: Point, modifiers: Modifiers) -> Result<(), QueueFull> {
    let rec = EventRecord { what, message, when: tick_count(), where_, modifiers };
    with_irqs_disabled(|| QUEUE.lock().push(rec))
}

pub fn post_event(what: EventKind, message: u32) -> Result<(), QueueFull> {
    post_raw(what, message, mouse_position(), Modifiers::empty())
}

/// Post a `mouseDown`, running multi-click detection first. No-op
/// (not an error) while the modal-tracking guard is set.
pub fn post_mouse_down(where_: Point, modifiers: Modifiers) -> Result<(), QueueFull> {
    if is_mouse_tracking() {
        return Ok(());
    }
    let now = tick_count();
    let count = {
        let mut mc = MULTI_CLICK.lock();
        let count = next_click_count(&mc, now, where_);
        mc.last_tick = now;
        mc.last_where = where_;
        mc.count = count;
        count
    };
    set_mouse_position(where_);
    post_raw(EventKind::MouseDown, (count as u32) << 16, where_, modifiers)
}

/// Post a `mouseUp`. Carries the click count from the most recent
/// `mouseDown` without resetting it (spec §4.7: "mouseUp does NOT
/// reset the count").
pub fn post_mouse_up(where_: Point, modifiers: Modifiers) -> Result<(), QueueFull> {
    if is_mouse_tracking() {
        return Ok(());
    }
    let count = MULTI_CLICK.lock().count;
    set_mouse_position(where_);
    post_raw(EventKind::MouseUp, (count as u32) << 16, where_, modifiers)
}

pub fn post_key(what: EventKind, char_code: u8, key_code: u8, modifiers: Modifiers) -> Result<(), QueueFull> {
    debug_assert!(matches!(what, EventKind::KeyDown | EventKind::KeyUp | EventKind::AutoKey));
    let message = (char_code as u32) | ((key_code as u32) << 8);
    post_raw(what, message, mouse_position(), modifiers)
}

/// Post an `updateEvt`/`activateEvt` carrying the window handle's raw
/// index in `message`, as the source carries a window pointer there.
pub fn post_window_event(what: EventKind, window_index: u32, modifiers: Modifiers) -> Result<(), QueueFull> {
    debug_assert!(matches!(what, EventKind::UpdateEvt | EventKind::ActivateEvt));
    post_raw(what, window_index, mouse_position(), modifiers)
}

/// Returns the oldest queued event matching `mask`, removing it; if
/// none match, returns a synthetic `nullEvent` at the current mouse
/// position and tick count (never fails — `nullEvent` is always in
/// range, and the synthetic fallback doesn't touch the queue).
pub fn get_next_event(mask: EventMask) -> EventRecord {
    let found = with_irqs_disabled(|| QUEUE.lock().take_matching(mask));
    found.unwrap_or_else(|| EventRecord::null_at(mouse_position()))
}

/// Same as `get_next_event`, but if nothing matches immediately, calls
/// `pump` (idle tasks / cursor animation / halt-until-interrupt) in a
/// loop until a match appears or `sleep` ticks have elapsed.
pub fn wait_next_event(mask: EventMask, sleep: Ticks, mut pump: impl FnMut()) -> EventRecord {
    let deadline = tick_count().wrapping_add(sleep);
    loop {
        if let Some(rec) = with_irqs_disabled(|| QUEUE.lock().take_matching(mask)) {
            return rec;
        }
        if tick_count() >= deadline {
            return EventRecord::null_at(mouse_position());
        }
        pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_push_pop_is_fifo() {
        let mut ring = Ring::new();
        ring.push(EventRecord::null_at(Point::new(1, 1))).unwrap();
        ring.push(EventRecord {
            what: EventKind::KeyDown,
            message: 5,
            when: 0,
            where_: Point::new(0, 0),
            modifiers: Modifiers::empty(),
        })
        .unwrap();
        let first = ring.take_matching(EventMask::ALL).unwrap();
        assert_eq!(first.what, EventKind::Null);
        let second = ring.take_matching(EventMask::ALL).unwrap();
        assert_eq!(second.what, EventKind::KeyDown);
    }

    #[test]
    fn multi_click_within_threshold_and_slop_increments_up_to_three() {
        // ticks 0, 10, 20 at the same point, threshold 30: 1, 2, 3.
        let mut mc = MultiClickState { last_tick: 0, last_where: Point::new(0, 0), count: 0 };
        let c1 = next_click_count(&mc, 0, Point::new(0, 0));
        assert_eq!(c1, 1);
        mc.last_tick = 0;
        mc.last_where = Point::new(0, 0);
        mc.count = c1;

        let c2 = next_click_count(&mc, 10, Point::new(0, 0));
        assert_eq!(c2, 2);
        mc.last_tick = 10;
        mc.count = c2;

        let c3 = next_click_count(&mc, 20, Point::new(0, 0));
        assert_eq!(c3, 3);
    }

    #[test]
    fn multi_click_past_threshold_restarts_the_run() {
        // ticks 0, 10, 100 at the same point, threshold 30: 1, 2, 1 —
        // the gap between tick 10 and tick 100 exceeds the threshold.
        let mut mc = MultiClickState { last_tick: 0, last_where: Point::new(0, 0), count: 0 };
        let c1 = next_click_count(&mc, 0, Point::new(0, 0));
        assert_eq!(c1, 1);
        mc.last_tick = 0;
        mc.count = c1;

        let c2 = next_click_count(&mc, 10, Point::new(0, 0));
        assert_eq!(c2, 2);
        mc.last_tick = 10;
        mc.count = c2;

        let c3 = next_click_count(&mc, 100, Point::new(0, 0));
        assert_eq!(c3, 1);
    }

    #[test]
    fn multi_click_outside_slop_restarts_the_run() {
        let mc = MultiClickState { last_tick: 0, last_where: Point::new(0, 0), count: 2 };
        let c = next_click_count(&mc, 10, Point::new(0, CLICK_SLOP + 1));
        assert_eq!(c, 1);
    }

    #[test]
    fn ring_rejects_push_past_capacity() {
        let mut ring = Ring::new();
        for _ in 0..QUEUE_CAPACITY {
            ring.push(EventRecord::null_at(Point::new(0, 0))).unwrap();
        }
        assert_eq!(ring.push(EventRecord::null_at(Point::new(0, 0))), Err(QueueFull));
    }

    #[test]
    fn take_matching_skips_non_matching_head() {
        let mut ring = Ring::new();
        ring.push(EventRecord::null_at(Point::new(0, 0))).unwrap();
        ring.push(EventRecord {
            what: EventKind::KeyDown,
            message: 0,
            when: 0,
            where_: Point::new(0, 0),
            modifiers: Modifiers::empty(),
        })
        .unwrap();
        let key = ring.take_matching(EventMask::KEY_DOWN).unwrap();
        assert_eq!(key.what, EventKind::KeyDown);
        let remaining = ring.take_matching(EventMask::ALL).unwrap();
        assert_eq!(remaining.what, EventKind::Null);
    }
}
