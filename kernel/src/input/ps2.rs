//! PS/2 backend: IRQ1 (keyboard) and IRQ12 (mouse) handlers. Wraps
//! `khal::keyboard`/`khal::mouse`'s register-level decoders, updates
//! the unified `DeviceState`, and posts events.
//!
//! Handler contract (spec §4.2/§5): must not block, must not allocate,
//! posts to the bounded queue rather than processing inline. The queue
//! push itself disables interrupts for its critical section, so these
//! handlers never need to do so directly.

use khal::keyboard::{KeyKind, KeyState};
use khal::mouse::{BTN_LEFT, BTN_MIDDLE, BTN_RIGHT};

use super::{apply_motion, set_buttons, set_key_state};
use crate::event::queue::{post_mouse_down, post_mouse_up};
use crate::event::{queue, EventKind, Modifiers};

pub fn init() {
    khal::keyboard::init();
    khal::mouse::init();
}

/// Registered on IRQ1. Decodes one scancode and posts a key event.
pub fn keyboard_irq_handler() {
    let scancode = khal::keyboard::read_scancode();
    let Some(event) = khal::keyboard::handle_scancode_event(scancode) else {
        return;
    };

    let code = scancode & 0x7F;
    let down = event.state == KeyState::Pressed;
    set_key_state(code, down);

    let char_code = match event.key {
        KeyKind::Char(ch) if ch.is_ascii() => ch as u8,
        _ => 0,
    };
    let what = if down { EventKind::KeyDown } else { EventKind::KeyUp };
    let _ = queue::post_key(what, char_code, code, current_modifiers());
}

/// Registered on IRQ12. Decodes one mouse packet byte; posts
/// `mouseDown`/`mouseUp` on button-state transitions.
pub fn mouse_irq_handler() {
    let byte = khal::mouse::read_data();
    let Some(packet) = khal::mouse::handle_byte(byte) else {
        return;
    };

    apply_motion(packet.dx, packet.dy);
    let prev = set_buttons(packet.buttons);
    let where_ = super::position();
    let modifiers = current_modifiers();

    let prev_down = prev & BTN_LEFT != 0;
    let down = packet.buttons & BTN_LEFT != 0;
    if !prev_down && down {
        let _ = post_mouse_down(where_, modifiers);
    } else if prev_down && !down {
        let _ = post_mouse_up(where_, modifiers);
    }
    let _ = (BTN_RIGHT, BTN_MIDDLE); // reserved for secondary-button chording
}

fn current_modifiers() -> Modifiers {
    // PS/2 Set-1 scancodes for the modifier keys, used directly as
    // internal keycodes (see input::mod's keymap convention).
    const LSHIFT: u8 = 0x2A;
    const RSHIFT: u8 = 0x36;
    const LCTRL: u8 = 0x1D;
    const LALT: u8 = 0x38;

    let mut m = Modifiers::empty();
    if super::key_down(LSHIFT) || super::key_down(RSHIFT) {
        m |= Modifiers::SHIFT;
    }
    if super::key_down(LCTRL) {
        m |= Modifiers::CONTROL;
    }
    if super::key_down(LALT) {
        m |= Modifiers::OPTION | Modifiers::COMMAND;
    }
    m
}
