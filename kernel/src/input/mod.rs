//! Input pipeline: PS/2 and USB HID backends feed one unified device
//! state, which IRQ handlers translate into posted events (spec §4.6).

pub mod hid;
pub mod ps2;

use spin::Mutex;

use crate::geom::Point;

/// Unified device state both backends update. Keyboard state is a
/// bitmap; bit `n` is set iff internal keycode `n` is currently held.
pub struct DeviceState {
    pub x: i16,
    pub y: i16,
    pub buttons: u8,
    pub keymap: [u8; 16],
}

impl DeviceState {
    const fn new() -> Self {
        Self { x: 0, y: 0, buttons: 0, keymap: [0; 16] }
    }

    fn set_key(&mut self, code: u8, down: bool) {
        let byte = (code / 8) as usize;
        let bit = code % 8;
        if byte >= self.keymap.len() {
            return;
        }
        if down {
            self.keymap[byte] |= 1 << bit;
        } else {
            self.keymap[byte] &= !(1 << bit);
        }
    }

    pub fn key_down(&self, code: u8) -> bool {
        let byte = (code / 8) as usize;
        let bit = code % 8;
        byte < self.keymap.len() && self.keymap[byte] & (1 << bit) != 0
    }
}

static DEVICE: Mutex<DeviceState> = Mutex::new(DeviceState::new());

/// Display bounds mouse accumulation is clamped to, set once the
/// framebuffer geometry is known during boot.
static BOUNDS: Mutex<(i16, i16)> = Mutex::new((0, 0));

pub fn set_display_bounds(width: i16, height: i16) {
    *BOUNDS.lock() = (width, height);
}

pub fn position() -> Point {
    let d = DEVICE.lock();
    Point::new(d.x, d.y)
}

pub fn buttons() -> u8 {
    DEVICE.lock().buttons
}

pub fn key_down(code: u8) -> bool {
    DEVICE.lock().key_down(code)
}

/// Apply a relative mouse movement, clamping to the display bounds on
/// every update (spec §4.6).
fn apply_motion(dx: i16, dy: i16) {
    let (w, h) = *BOUNDS.lock();
    let mut d = DEVICE.lock();
    d.x = (d.x + dx).clamp(0, w.saturating_sub(1).max(0));
    d.y = (d.y - dy).clamp(0, h.saturating_sub(1).max(0));
}

fn set_buttons(buttons: u8) -> u8 {
    let mut d = DEVICE.lock();
    let prev = d.buttons;
    d.buttons = buttons;
    prev
}

fn set_key_state(code: u8, down: bool) {
    DEVICE.lock().set_key(code, down);
}
