//! Window Manager core: `GrafPort`, `BitMap`, the window arena and
//! z-order list, lifecycle, and the coordinate discipline that keeps
//! `portRect` local forever (spec §4.10.2 — "any component that writes
//! to `portRect` breaks rendering and is a bug", enforced here by never
//! exposing a public setter for it outside of `resize`).

use alloc::vec::Vec;

use crate::drivers::framebuffer::Framebuffer;
use crate::geom::{Pattern, Point, Rect};
use crate::region::{Region, RegionArena, RegionId};

/// Border/title/separator geometry a new window's content area is
/// offset from its bounds by (spec §4.10.1 step 3).
pub const BORDER: i16 = 1;
pub const TITLE_HEIGHT: i16 = 20;
pub const SEPARATOR: i16 = 1;

/// Bottom-right grow-box hit region size.
pub const GROW_BOX_SIZE: i16 = 15;

/// A bitmap: a pixel buffer plus the global rect its origin maps to.
#[derive(Debug, Clone, Copy)]
pub struct BitMap {
    pub base_addr: *mut u8,
    pub row_bytes: i32,
    pub bounds: Rect,
}

// Safety matches Framebuffer's: mutated only from main-line code.
unsafe impl Send for BitMap {}
unsafe impl Sync for BitMap {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenMode {
    Copy,
    Xor,
}

/// A drawing context. `port_rect` is always `(0, 0, w, h)` — see the
/// module doc comment; only `resize()` is allowed to change it, and it
/// does so in lockstep with `port_bits.bounds`.
pub struct GrafPort {
    pub port_bits: BitMap,
    port_rect: Rect,
    pub clip_rgn: Region,
    pub vis_rgn: Region,
    pub pn_loc: Point,
    pub pn_size: Point,
    pub pn_mode: PenMode,
    pub pn_pat: Pattern,
    pub bk_pat: Pattern,
    pub fill_pat: Pattern,
    pub pn_vis: i16,
}

impl GrafPort {
    pub fn port_rect(&self) -> Rect {
        self.port_rect
    }

    fn new(bounds: Rect) -> Self {
        let w = bounds.width();
        let h = bounds.height();
        let port_rect = Rect::new(0, 0, h, w);
        Self {
            port_bits: BitMap { base_addr: core::ptr::null_mut(), row_bytes: 0, bounds },
            port_rect,
            clip_rgn: Region::from_rect(port_rect),
            vis_rgn: Region::from_rect(port_rect),
            pn_loc: Point::new(0, 0),
            pn_size: Point::new(1, 1),
            pn_mode: PenMode::Copy,
            pn_pat: Pattern::BLACK,
            bk_pat: Pattern::WHITE,
            fill_pat: Pattern::BLACK,
            pn_vis: 0,
        }
    }

    /// Move: shift `port_bits.bounds` only. `port_rect` is untouched
    /// (spec §4.10.2).
    fn move_by(&mut self, dh: i16, dv: i16) {
        self.port_bits.bounds = self.port_bits.bounds.offset(dh, dv);
    }

    /// Resize: `port_rect` becomes `(0,0,w,h)`; `port_bits.bounds`'s
    /// right/bottom move to match; clip/vis regions are rebuilt to the
    /// new local rect (spec §4.10.2).
    fn resize(&mut self, w: i16, h: i16) {
        self.port_rect = Rect::new(0, 0, h, w);
        self.port_bits.bounds.right = self.port_bits.bounds.left + w;
        self.port_bits.bounds.bottom = self.port_bits.bounds.top + h;
        self.clip_rgn = Region::from_rect(self.port_rect);
        self.vis_rgn = Region::from_rect(self.port_rect);
    }

    /// Local point `p` to its global pixel per the coordinate mapping
    /// invariant: `global = local + (bounds.left, bounds.top)`.
    pub fn local_to_global(&self, p: Point) -> Point {
        Point::new(p.h + self.port_bits.bounds.left, p.v + self.port_bits.bounds.top)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowId(u32);

impl WindowId {
    /// Raw arena index, for carrying a window handle in an
    /// `EventRecord::message` field (spec §3: "message carries the
    /// window pointer" for update/activate events).
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

pub fn window_id_from_raw(raw: u32) -> WindowId {
    WindowId(raw)
}

/// Where a global point hit, per `find_window` (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPart {
    Desk,
    Drag,
    GoAway,
    Grow,
    Content,
}

pub struct Window {
    pub port: GrafPort,
    pub struc_rgn: RegionId,
    pub cont_rgn: RegionId,
    pub update_rgn: RegionId,
    pub window_kind: i16,
    pub visible: bool,
    pub hilited: bool,
    pub go_away: bool,
    pub ref_con: i32,
    pub title: alloc::string::String,
}

pub struct WindowManager {
    windows: Vec<Option<Window>>,
    /// Front-to-back z-order; index 0 is frontmost.
    z_order: Vec<WindowId>,
    pub regions: RegionArena,
}

impl WindowManager {
    pub const fn new() -> Self {
        Self { windows: Vec::new(), z_order: Vec::new(), regions: RegionArena::new() }
    }

    fn slot(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.slot(id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.slot_mut(id)
    }

    pub fn z_order(&self) -> &[WindowId] {
        &self.z_order
    }

    /// `new_window` (spec §4.10.1): global screen bounds, title,
    /// initial visibility, insertion point in z-order (`None` = front).
    pub fn new_window(
        &mut self,
        bounds: Rect,
        title: &str,
        visible: bool,
        behind: Option<WindowId>,
        go_away: bool,
        ref_con: i32,
    ) -> WindowId {
        let content = Rect::new(
            bounds.top + TITLE_HEIGHT + SEPARATOR,
            bounds.left + BORDER,
            bounds.bottom - BORDER,
            bounds.right - BORDER,
        );
        let mut port = GrafPort::new(content);
        port.port_bits.bounds = content;

        let struc_rgn = self.regions.alloc(Region::from_rect(bounds));
        let cont_rgn = self.regions.alloc(Region::from_rect(content));
        let update_rgn = self.regions.alloc(Region::new());

        let window = Window {
            port,
            struc_rgn,
            cont_rgn,
            update_rgn,
            window_kind: 0,
            visible,
            hilited: false,
            go_away,
            ref_con,
            title: alloc::string::String::from(title),
        };

        let id = self.alloc_slot(window);
        self.insert_z(id, behind);
        if visible {
            self.invalidate_content(id);
        }
        id
    }

    fn alloc_slot(&mut self, window: Window) -> WindowId {
        for (i, slot) in self.windows.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(window);
                return WindowId(i as u32);
            }
        }
        self.windows.push(Some(window));
        WindowId((self.windows.len() - 1) as u32)
    }

    fn insert_z(&mut self, id: WindowId, behind: Option<WindowId>) {
        match behind {
            None => self.z_order.insert(0, id),
            Some(b) => {
                if let Some(pos) = self.z_order.iter().position(|&w| w == b) {
                    self.z_order.insert(pos + 1, id);
                } else {
                    self.z_order.push(id);
                }
            }
        }
    }

    /// `dispose_window` (spec §4.10.1): remove from z-order, invalidate
    /// the covered area on windows below, free the regions and slot.
    pub fn dispose_window(&mut self, id: WindowId) {
        let Some(pos) = self.z_order.iter().position(|&w| w == id) else {
            return;
        };
        self.z_order.remove(pos);

        if let Some(window) = self.slot(id) {
            let struc = self.regions.get(window.struc_rgn).cloned();
            self.regions.dispose(window.struc_rgn);
            self.regions.dispose(window.cont_rgn);
            self.regions.dispose(window.update_rgn);
            if let Some(exposed) = struc {
                self.invalidate_region_below(pos, &exposed);
            }
        }
        if let Some(slot) = self.windows.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    fn invalidate_region_below(&mut self, from_z_index: usize, exposed: &Region) {
        for &id in self.z_order[from_z_index..].to_vec().iter() {
            if let Some(window) = self.slot(id) {
                let cont = self.regions.get(window.cont_rgn).cloned();
                if let Some(cont) = cont {
                    if cont.bbox.intersects(&exposed.bbox) {
                        self.invalidate_content(id);
                        break;
                    }
                }
            }
        }
    }

    /// Mark a window's entire content area for redraw.
    pub fn invalidate_content(&mut self, id: WindowId) {
        let Some(window) = self.slot(id) else { return };
        let Some(cont) = self.regions.get(window.cont_rgn).cloned() else { return };
        if let Some(update) = self.regions.get_mut(window.update_rgn) {
            *update = crate::region::union(update, &cont);
        }
    }

    /// Move by `(dh, dv)`: shift `port_bits.bounds`, `struc_rgn`,
    /// `cont_rgn`; `port_rect` is never touched (spec §4.10.2).
    pub fn move_window(&mut self, id: WindowId, dh: i16, dv: i16) {
        let Some(window) = self.slot_mut(id) else { return };
        window.port.move_by(dh, dv);
        let struc = window.struc_rgn;
        let cont = window.cont_rgn;
        if let Some(r) = self.regions.get_mut(struc) {
            r.offset(dh, dv);
        }
        if let Some(r) = self.regions.get_mut(cont) {
            r.offset(dh, dv);
        }
    }

    /// Resize to `(w, h)`; rebuilds `port_rect`/regions per §4.10.2.
    pub fn resize_window(&mut self, id: WindowId, w: i16, h: i16) {
        let Some(window) = self.slot_mut(id) else { return };
        window.port.resize(w, h);
        let bounds = window.port.port_bits.bounds;
        let struc = Rect::new(
            bounds.top - TITLE_HEIGHT - SEPARATOR,
            bounds.left - BORDER,
            bounds.bottom + BORDER,
            bounds.right + BORDER,
        );
        let struc_id = window.struc_rgn;
        let cont_id = window.cont_rgn;
        if let Some(r) = self.regions.get_mut(struc_id) {
            r.set_rect(struc);
        }
        if let Some(r) = self.regions.get_mut(cont_id) {
            r.set_rect(bounds);
        }
        self.invalidate_content(id);
    }

    /// `begin_update`: intersect `clip_rgn` with `update_rgn`.
    /// `end_update`: restore clip and empty `update_rgn`. The caller's
    /// draw procedure runs between the two (spec §4.10.4).
    pub fn begin_update(&mut self, id: WindowId) -> Option<Region> {
        let window = self.slot(id)?;
        let saved_clip = window.port.clip_rgn.clone();
        let update = self.regions.get(window.update_rgn)?.clone();
        let window = self.slot_mut(id)?;
        window.port.clip_rgn = crate::region::intersect(&window.port.clip_rgn, &update);
        Some(saved_clip)
    }

    pub fn end_update(&mut self, id: WindowId, saved_clip: Region) {
        if let Some(window) = self.slot_mut(id) {
            window.port.clip_rgn = saved_clip;
            let update_id = window.update_rgn;
            if let Some(r) = self.regions.get_mut(update_id) {
                *r = Region::new();
            }
        }
    }

    /// `find_window` (spec §4.8): front-to-back hit test against the
    /// title bar (drag), close box (goAway), grow box, or content.
    /// First hit wins; no hit anywhere returns `Desk`.
    pub fn find_window(&self, where_: Point) -> (WindowPart, Option<WindowId>) {
        for &id in &self.z_order {
            let Some(window) = self.slot(id) else { continue };
            if !window.visible {
                continue;
            }
            let Some(struc) = self.regions.get(window.struc_rgn) else { continue };
            if !struc.bbox.contains(where_) {
                continue;
            }
            let Some(cont) = self.regions.get(window.cont_rgn) else { continue };
            if cont.bbox.contains(where_) {
                return (WindowPart::Content, Some(id));
            }
            let grow_box = Rect::new(
                struc.bbox.bottom - GROW_BOX_SIZE,
                struc.bbox.right - GROW_BOX_SIZE,
                struc.bbox.bottom,
                struc.bbox.right,
            );
            if grow_box.contains(where_) {
                return (WindowPart::Grow, Some(id));
            }
            if window.go_away {
                let go_away_box = Rect::new(
                    struc.bbox.top + 4,
                    struc.bbox.left + 4,
                    struc.bbox.top + TITLE_HEIGHT - 4,
                    struc.bbox.left + TITLE_HEIGHT - 4,
                );
                if go_away_box.contains(where_) {
                    return (WindowPart::GoAway, Some(id));
                }
            }
            let title_bar = Rect::new(struc.bbox.top, struc.bbox.left, struc.bbox.top + TITLE_HEIGHT, struc.bbox.right);
            if title_bar.contains(where_) {
                return (WindowPart::Drag, Some(id));
            }
            // Inside the structure region but none of the hot zones
            // above — still counts as a content hit for a borderless
            // region of the frame (e.g. the window's shadow edge).
            return (WindowPart::Content, Some(id));
        }
        (WindowPart::Desk, None)
    }

    pub fn front(&self) -> Option<WindowId> {
        self.z_order.first().copied()
    }

    /// Bring `id` to the front of the z-order.
    pub fn select(&mut self, id: WindowId) {
        if let Some(pos) = self.z_order.iter().position(|&w| w == id) {
            let id = self.z_order.remove(pos);
            self.z_order.insert(0, id);
        }
    }
}

pub fn framebuffer_bitmap(fb: &Framebuffer) -> BitMap {
    BitMap {
        base_addr: fb as *const Framebuffer as *mut u8,
        row_bytes: fb.pitch as i32,
        bounds: Rect::new(0, 0, fb.height as i16, fb.width as i16),
    }
}

/// `drag_window` (spec §4.10.3): sets the modal-tracking guard, then on
/// each pump iteration reads the mouse and redraws an XOR-painted
/// outline at the candidate position (self-erasing since a second XOR
/// restores the pixels). On mouse-up, commits the move per §4.10.2 and
/// clears the guard.
///
/// `poll` returns the current global mouse point and whether the
/// tracked button is still down. `draw_outline` XOR-paints a rect's
/// frame into the framebuffer; called once per candidate position,
/// including a final call to erase the last-drawn outline before the
/// move is committed.
pub fn track_drag(
    wm: &mut WindowManager,
    id: WindowId,
    start: Point,
    mut poll: impl FnMut() -> (Point, bool),
    mut draw_outline: impl FnMut(Rect),
) {
    let Some(window) = wm.get(id) else { return };
    let Some(origin) = wm.regions.get(window.struc_rgn).map(|r| r.bbox) else { return };

    crate::event::queue::set_mouse_tracking(true);
    let mut last_drawn: Option<Rect> = None;
    loop {
        let (pt, down) = poll();
        let candidate = origin.offset(pt.h - start.h, pt.v - start.v);
        if let Some(prev) = last_drawn {
            if prev != candidate {
                draw_outline(prev); // erase previous (XOR is its own inverse)
                draw_outline(candidate);
                last_drawn = Some(candidate);
            }
        } else {
            draw_outline(candidate);
            last_drawn = Some(candidate);
        }
        if !down {
            if let Some(prev) = last_drawn {
                draw_outline(prev); // final erase before committing
            }
            wm.move_window(id, pt.h - start.h, pt.v - start.v);
            break;
        }
    }
    crate::event::queue::set_mouse_tracking(false);
}

/// `grow_window` (spec §4.10.3): same pump pattern, candidate size
/// clamped to `size_rect`.
pub fn track_grow(
    wm: &mut WindowManager,
    id: WindowId,
    start: Point,
    size_rect: Rect,
    mut poll: impl FnMut() -> (Point, bool),
    mut draw_outline: impl FnMut(Rect),
) {
    let Some(window) = wm.get(id) else { return };
    let Some(origin) = wm.regions.get(window.struc_rgn).map(|r| r.bbox) else { return };

    crate::event::queue::set_mouse_tracking(true);
    let mut last_drawn: Option<Rect> = None;
    loop {
        let (pt, down) = poll();
        let w = (origin.width() + (pt.h - start.h)).clamp(size_rect.left, size_rect.right);
        let h = (origin.height() + (pt.v - start.v)).clamp(size_rect.top, size_rect.bottom);
        let candidate = Rect::new(origin.top, origin.left, origin.top + h, origin.left + w);
        if last_drawn != Some(candidate) {
            if let Some(prev) = last_drawn {
                draw_outline(prev);
            }
            draw_outline(candidate);
            last_drawn = Some(candidate);
        }
        if !down {
            if let Some(prev) = last_drawn {
                draw_outline(prev);
            }
            wm.resize_window(id, w, h);
            break;
        }
    }
    crate::event::queue::set_mouse_tracking(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `new_window((40,40,440,340), "Test", true, ...)` (spec §8
    /// Scenario 2): `strucRgn.bbox = (40,40,440,340)`,
    /// `contRgn.bbox = (41,61,439,339)`, `portRect = (0,0,398,278)`.
    #[test]
    fn new_window_produces_the_spec_worked_example_rects() {
        let mut wm = WindowManager::new();
        let bounds = Rect::new(40, 40, 340, 440);
        let id = wm.new_window(bounds, "Test", true, None, true, 0);

        let window = wm.get(id).unwrap();
        let struc = wm.regions.get(window.struc_rgn).unwrap();
        let cont = wm.regions.get(window.cont_rgn).unwrap();

        assert_eq!(struc.bbox, Rect::new(40, 40, 340, 440));
        assert_eq!(cont.bbox, Rect::new(61, 41, 339, 439));
        assert_eq!(window.port.port_rect(), Rect::new(0, 0, 278, 398));
    }

    #[test]
    fn port_rect_stays_local_after_move_and_resize() {
        let mut wm = WindowManager::new();
        let bounds = Rect::new(40, 40, 340, 440);
        let id = wm.new_window(bounds, "Test", true, None, true, 0);

        wm.move_window(id, 10, -5);
        let after_move = wm.get(id).unwrap().port.port_rect();
        assert_eq!(after_move, Rect::new(0, 0, 278, 398));

        wm.resize_window(id, 200, 100);
        let after_resize = wm.get(id).unwrap().port.port_rect();
        assert_eq!(after_resize, Rect::new(0, 0, 100, 200));
    }

    #[test]
    fn dispose_window_removes_it_from_z_order() {
        let mut wm = WindowManager::new();
        let bounds = Rect::new(40, 40, 340, 440);
        let id = wm.new_window(bounds, "Test", true, None, true, 0);
        assert_eq!(wm.z_order(), &[id]);

        wm.dispose_window(id);
        assert!(wm.z_order().is_empty());
        assert!(wm.get(id).is_none());
    }
}
