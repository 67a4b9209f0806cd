//! Event dispatcher: classifies a posted `EventRecord` by what was hit
//! and routes it to the window manager (spec §4.8), grounded in
//! `original_source`'s `EventDispatcher.c` routing table (menu bar /
//! drag / goAway / grow / content / desk).

use crate::event::{EventKind, EventRecord, Modifiers};
use crate::geom::Point;
use crate::window::{WindowId, WindowManager, WindowPart};

/// Best-effort outcome of one dispatch call, for callers (tests, the
/// boot-time event loop) that want to observe routing without wiring
/// up real drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    MenuSelect(Point),
    DragWindow(WindowId, Point),
    CloseWindow(WindowId),
    GrowWindow(WindowId, Point),
    SelectWindow(WindowId),
    ContentClick(WindowId, Point),
    DesktopClick(Point, bool),
    KeyToFrontWindow(Option<WindowId>, u8),
    MenuShortcut(u8),
    Update(WindowId),
    Activate(WindowId, bool),
    Idle,
    Ignored,
}

/// Height of the menu strip at the top of the screen; a `mouseDown`
/// above this line is `inMenuBar` before `find_window` is even asked.
const MENU_BAR_HEIGHT: i16 = 20;

pub fn dispatch(wm: &mut WindowManager, event: &EventRecord) -> Routed {
    match event.what {
        EventKind::MouseDown => dispatch_mouse_down(wm, event),
        EventKind::MouseUp => Routed::Ignored, // tracking loops own mouse-up while active
        EventKind::KeyDown | EventKind::AutoKey => dispatch_key(wm, event),
        EventKind::KeyUp => Routed::Ignored,
        EventKind::UpdateEvt => Routed::Update(window_from_message(event.message)),
        EventKind::ActivateEvt => {
            Routed::Activate(window_from_message(event.message), event.modifiers.contains(Modifiers::ACTIVE))
        }
        EventKind::Null => Routed::Idle,
        EventKind::DiskEvt | EventKind::OsEvt => Routed::Ignored,
    }
}

fn window_from_message(message: u32) -> WindowId {
    // Encoded by event::queue::post_window_event as a raw arena index.
    // SAFETY-equivalent: WindowId's inner field isn't public, so
    // round-tripping goes through this crate-local constructor.
    crate::window::window_id_from_raw(message)
}

fn dispatch_mouse_down(wm: &mut WindowManager, event: &EventRecord) -> Routed {
    if event.where_.v < MENU_BAR_HEIGHT {
        return Routed::MenuSelect(event.where_);
    }

    let (part, window) = wm.find_window(event.where_);
    match part {
        WindowPart::Desk => Routed::DesktopClick(event.where_, event.click_count() >= 2),
        WindowPart::Drag => window.map(|w| Routed::DragWindow(w, event.where_)).unwrap_or(Routed::Ignored),
        WindowPart::GoAway => window.map(Routed::CloseWindow).unwrap_or(Routed::Ignored),
        WindowPart::Grow => window.map(|w| Routed::GrowWindow(w, event.where_)).unwrap_or(Routed::Ignored),
        WindowPart::Content => {
            let Some(id) = window else { return Routed::Ignored };
            if wm.front() != Some(id) {
                wm.select(id);
                Routed::SelectWindow(id)
            } else {
                Routed::ContentClick(id, event.where_)
            }
        }
    }
}

fn dispatch_key(wm: &WindowManager, event: &EventRecord) -> Routed {
    let char_code = (event.message & 0xFF) as u8;
    if event.modifiers.contains(Modifiers::COMMAND) {
        return Routed::MenuShortcut(char_code);
    }
    Routed::KeyToFrontWindow(wm.front(), char_code)
}
