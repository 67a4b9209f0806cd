//! Rasterizer: clipped line/rect/pattern drawing into the framebuffer
//! (spec §4.10.5). Every primitive takes local coordinates from the
//! port's `portRect` frame and maps them to global pixels through
//! `port_bits.bounds` before clipping against `portRect ∩ clipRgn ∩
//! visRgn ∩` the framebuffer bounds.

use crate::drivers::framebuffer::Framebuffer;
use crate::geom::{Point, Rect};
use crate::region::{self, Region};
use crate::window::{GrafPort, PenMode};

/// Intersection of `portRect`, `clipRgn`, and `visRgn`, in local
/// coordinates — the clip every drawing primitive must honor.
fn effective_clip(port: &GrafPort) -> Region {
    let port_rect = Region::from_rect(port.port_rect());
    let a = region::intersect(&port_rect, &port.clip_rgn);
    region::intersect(&a, &port.vis_rgn)
}

fn pack(fb: &Framebuffer, pattern_bit: bool) -> u32 {
    if pattern_bit {
        fb.format.pack(0, 0, 0)
    } else {
        fb.format.pack(255, 255, 255)
    }
}

fn blend(fb: &Framebuffer, x: u32, y: u32, color: u32, mode: PenMode) {
    match mode {
        PenMode::Copy => fb.put_pixel(x, y, color),
        PenMode::Xor => fb.xor_pixel(x, y, color),
    }
}

/// Paint one local point through the port's pen pattern and mode.
pub fn paint_point(fb: &Framebuffer, port: &GrafPort, local: Point) {
    let clip = effective_clip(port);
    if !clip.point_in(local) {
        return;
    }
    let global = port.local_to_global(local);
    if global.h < 0 || global.v < 0 {
        return;
    }
    let on = port.pn_pat.bit_at(local.h, local.v);
    let color = pack(fb, on);
    blend(fb, global.h as u32, global.v as u32, color, port.pn_mode);
}

/// Frame (outline) a local rect: top/bottom edges then left/right,
/// each `pn_size.v`/`pn_size.h` pixels thick.
pub fn frame_rect(fb: &Framebuffer, port: &GrafPort, r: Rect) {
    if r.is_empty() {
        return;
    }
    for x in r.left..r.right {
        for t in 0..port.pn_size.v.max(1) {
            paint_point(fb, port, Point::new(x, r.top + t));
            paint_point(fb, port, Point::new(x, r.bottom - 1 - t));
        }
    }
    for y in r.top..r.bottom {
        for t in 0..port.pn_size.h.max(1) {
            paint_point(fb, port, Point::new(r.left + t, y));
            paint_point(fb, port, Point::new(r.right - 1 - t, y));
        }
    }
}

/// Fill a local rect with the port's fill pattern.
pub fn fill_rect(fb: &Framebuffer, port: &GrafPort, r: Rect) {
    if r.is_empty() {
        return;
    }
    for y in r.top..r.bottom {
        for x in r.left..r.right {
            paint_point(fb, port, Point::new(x, y));
        }
    }
}

/// Invert (XOR against white) every pixel in a local rect, regardless
/// of the port's configured pen mode — used for drag/grow outlines.
pub fn invert_rect(fb: &Framebuffer, port: &GrafPort, r: Rect) {
    if r.is_empty() {
        return;
    }
    let clip = effective_clip(port);
    let white = fb.format.pack(255, 255, 255);
    for y in r.top..r.bottom {
        for x in r.left..r.right {
            let local = Point::new(x, y);
            if !clip.point_in(local) {
                continue;
            }
            let global = port.local_to_global(local);
            if global.h >= 0 && global.v >= 0 {
                fb.xor_pixel(global.h as u32, global.v as u32, white);
            }
        }
    }
}

/// Clipped straight line between two local points (Bresenham).
pub fn draw_line(fb: &Framebuffer, port: &GrafPort, from: Point, to: Point) {
    let mut x0 = from.h as i32;
    let mut y0 = from.v as i32;
    let x1 = to.h as i32;
    let y1 = to.v as i32;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        paint_point(fb, port, Point::new(x0 as i16, y0 as i16));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
