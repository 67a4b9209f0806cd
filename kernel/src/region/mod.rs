//! Region engine: the window manager's 2D set representation and its
//! Boolean algebra. Grounded in the classic QuickDraw `Region` value —
//! a bounding box plus an optional scan-line encoding — reworked onto a
//! dense arena (`RegionId`) instead of a relocatable-handle heap, per
//! the Handle-based-relocatable-heap design note: arena allocation
//! solves the same fragmentation problem a compactor would, and the
//! lock/unlock dance collapses to borrow checking.

use alloc::vec::Vec;

use crate::geom::{Point, Rect};

/// One scan line's alternating in/out x-boundaries, strictly increasing.
type ScanLine = (i16, Vec<i16>);

/// A 2D pixel set: `bbox` is always the tight bounding box. When `rows`
/// is empty the region is exactly `bbox` (the rectangular fast-path);
/// otherwise `rows` holds one entry per non-empty scan line, each a
/// sorted list of boundary x-coordinates (even count, alternating
/// inside/outside).
#[derive(Debug, Clone, Default)]
pub struct Region {
    pub bbox: Rect,
    rows: Vec<ScanLine>,
}

impl Region {
    pub const fn new() -> Self {
        Self { bbox: Rect::empty(), rows: Vec::new() }
    }

    pub fn set_rect(&mut self, r: Rect) {
        self.bbox = if r.is_empty() { Rect::empty() } else { r };
        self.rows.clear();
    }

    pub fn from_rect(r: Rect) -> Self {
        let mut region = Self::new();
        region.set_rect(r);
        region
    }

    #[inline]
    pub fn is_rectangular(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.bbox.is_empty()
    }

    /// Shift the whole region by `(dh, dv)`.
    pub fn offset(&mut self, dh: i16, dv: i16) {
        if self.is_empty() {
            return;
        }
        self.bbox = self.bbox.offset(dh, dv);
        for (y, xs) in self.rows.iter_mut() {
            *y += dv;
            for x in xs.iter_mut() {
                *x += dh;
            }
        }
    }

    /// Inset by `(dh, dv)`. Rectangular regions inset exactly;
    /// a complex region's scan lines are insetted per the Open
    /// Questions decision recorded in DESIGN.md (approximate — see
    /// there for why exact complex inset is not provided).
    pub fn inset(&mut self, dh: i16, dv: i16) {
        if self.is_rectangular() {
            self.bbox = self.bbox.inset(dh, dv);
            return;
        }
        self.bbox = self.bbox.inset(dh, dv);
        if self.bbox.is_empty() {
            self.rows.clear();
            return;
        }
        for (y, xs) in self.rows.iter_mut() {
            *y += dv;
            for x in xs.iter_mut() {
                *x += dh;
            }
        }
        self.rows.retain(|(y, _)| *y >= self.bbox.top && *y < self.bbox.bottom);
    }

    /// Iterate this region's rows as `(y, &[x0, x1, x2, x3, ...])` pairs,
    /// synthesizing a single row pair for the rectangular fast-path so
    /// callers never special-case it.
    fn expand_rows(&self) -> Vec<ScanLine> {
        if self.is_rectangular() {
            if self.is_empty() {
                return Vec::new();
            }
            (self.bbox.top..self.bbox.bottom)
                .map(|y| (y, alloc::vec![self.bbox.left, self.bbox.right]))
                .collect()
        } else {
            self.rows.clone()
        }
    }

    fn from_rows(rows: Vec<ScanLine>) -> Self {
        let mut rows: Vec<ScanLine> = rows.into_iter().filter(|(_, xs)| !xs.is_empty()).collect();
        rows.sort_by_key(|(y, _)| *y);
        if rows.is_empty() {
            return Self::new();
        }
        let top = rows.first().unwrap().0;
        let bottom = rows.last().unwrap().0 + 1;
        let mut left = i16::MAX;
        let mut right = i16::MIN;
        for (_, xs) in &rows {
            left = left.min(*xs.first().unwrap());
            right = right.max(*xs.last().unwrap());
        }
        let bbox = Rect::new(top, left, bottom, right);

        // Collapse to the rectangular fast-path when every row is the
        // single pair (left, right) — keeps union(rect, rect) stored
        // compactly and matches the spec's "store as rectangular" rule.
        let is_single_rect = rows.iter().enumerate().all(|(i, (y, xs))| {
            *y == top + i as i16 && xs.as_slice() == [left, right]
        });
        if is_single_rect {
            return Self { bbox, rows: Vec::new() };
        }
        Self { bbox, rows }
    }

    pub fn point_in(&self, p: Point) -> bool {
        if !self.bbox.contains(p) {
            return false;
        }
        if self.is_rectangular() {
            return true;
        }
        let Some((_, xs)) = self.rows.iter().find(|(y, _)| *y == p.v) else {
            return false;
        };
        // Even-indexed boundaries open a span, odd-indexed close it.
        let mut inside = false;
        for &x in xs {
            if p.h < x {
                break;
            }
            inside = !inside;
        }
        inside
    }

    /// Exact rect/region intersection test (the spec requires this, not
    /// the bbox-only short-circuit some call sites in the original used).
    pub fn rect_intersects(&self, r: &Rect) -> bool {
        if !self.bbox.intersects(r) {
            return false;
        }
        if self.is_rectangular() {
            return true;
        }
        for (y, xs) in &self.rows {
            if *y < r.top || *y >= r.bottom {
                continue;
            }
            let mut inside = false;
            let mut prev = i16::MIN;
            for &x in xs {
                if inside && r.left < x && r.right > prev {
                    return true;
                }
                prev = x;
                inside = !inside;
            }
        }
        false
    }
}

fn merge_rows(a: &[ScanLine], b: &[ScanLine], op: BoolOp) -> Vec<ScanLine> {
    let mut out = Vec::new();
    let mut ai = 0;
    let mut bi = 0;
    while ai < a.len() || bi < b.len() {
        let y = match (a.get(ai), b.get(bi)) {
            (Some((ya, _)), Some((yb, _))) => (*ya).min(*yb),
            (Some((ya, _)), None) => *ya,
            (None, Some((yb, _))) => *yb,
            (None, None) => break,
        };
        let xs_a: &[i16] = a.get(ai).filter(|(ya, _)| *ya == y).map(|(_, xs)| xs.as_slice()).unwrap_or(&[]);
        let xs_b: &[i16] = b.get(bi).filter(|(yb, _)| *yb == y).map(|(_, xs)| xs.as_slice()).unwrap_or(&[]);
        let merged = merge_spans(xs_a, xs_b, op);
        if !merged.is_empty() {
            out.push((y, merged));
        }
        if a.get(ai).map(|(ya, _)| *ya == y).unwrap_or(false) {
            ai += 1;
        }
        if b.get(bi).map(|(yb, _)| *yb == y).unwrap_or(false) {
            bi += 1;
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BoolOp {
    Union,
    Intersect,
    Difference,
    Xor,
}

/// Sweep two sorted boundary lists left to right, tracking membership in
/// each span and emitting boundaries wherever the combined membership
/// (per `op`) flips. Produces a canonical strictly-increasing,
/// alternating-parity output with adjacent identical spans merged.
fn merge_spans(a: &[i16], b: &[i16], op: BoolOp) -> Vec<i16> {
    let mut xs: Vec<i16> = a.iter().chain(b.iter()).copied().collect();
    xs.sort_unstable();
    xs.dedup();

    let in_a = |x: i16| -> bool {
        let mut inside = false;
        for &b in a {
            if x < b {
                break;
            }
            inside = !inside;
        }
        inside
    };
    let in_b = |x: i16| -> bool {
        let mut inside = false;
        for &c in b {
            if x < c {
                break;
            }
            inside = !inside;
        }
        inside
    };

    let combined = |x: i16| -> bool {
        let ia = in_a(x);
        let ib = in_b(x);
        match op {
            BoolOp::Union => ia || ib,
            BoolOp::Intersect => ia && ib,
            BoolOp::Difference => ia && !ib,
            BoolOp::Xor => ia != ib,
        }
    };

    let mut out = Vec::new();
    let mut prev_state = false;
    for &x in &xs {
        let state = combined(x);
        if state != prev_state {
            out.push(x);
        }
        prev_state = state;
    }
    out
}

fn bool_op(a: &Region, b: &Region, op: BoolOp) -> Region {
    let rows_a = a.expand_rows();
    let rows_b = b.expand_rows();
    Region::from_rows(merge_rows(&rows_a, &rows_b, op))
}

pub fn union(a: &Region, b: &Region) -> Region {
    bool_op(a, b, BoolOp::Union)
}

pub fn intersect(a: &Region, b: &Region) -> Region {
    bool_op(a, b, BoolOp::Intersect)
}

pub fn difference(a: &Region, b: &Region) -> Region {
    bool_op(a, b, BoolOp::Difference)
}

pub fn xor(a: &Region, b: &Region) -> Region {
    bool_op(a, b, BoolOp::Xor)
}

/// Dense arena of regions, replacing the source's relocatable `Handle`.
/// `RegionId` is the public handle; `get`/`get_mut` stand in for
/// lock/unlock — borrow checking enforces what the compactor's lock
/// interval used to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionId(u32);

#[derive(Default)]
pub struct RegionArena {
    slots: Vec<Option<Region>>,
}

impl RegionArena {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn alloc(&mut self, region: Region) -> RegionId {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(region);
                return RegionId(i as u32);
            }
        }
        self.slots.push(Some(region));
        RegionId((self.slots.len() - 1) as u32)
    }

    pub fn dispose(&mut self, id: RegionId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(t: i16, l: i16, b: i16, r: i16) -> Region {
        Region::from_rect(Rect::new(t, l, b, r))
    }

    #[test]
    fn rectangular_fast_path_point_in_region() {
        let r = rect(0, 0, 10, 10);
        assert!(r.point_in(Point::new(5, 5)));
        assert!(!r.point_in(Point::new(10, 5)));
    }

    #[test]
    fn union_of_overlapping_rects_stays_rectangular() {
        let a = rect(0, 0, 10, 10);
        let b = rect(0, 5, 10, 15);
        let u = union(&a, &b);
        assert!(u.is_rectangular());
        assert_eq!(u.bbox, Rect::new(0, 0, 10, 15));
    }

    #[test]
    fn union_of_disjoint_rects_is_complex_with_two_spans() {
        let a = rect(0, 0, 10, 10);
        let b = rect(0, 20, 10, 30);
        let u = union(&a, &b);
        assert_eq!(u.bbox, Rect::new(0, 0, 10, 30));
        assert!(!u.is_rectangular());
        let row0 = u.expand_rows().into_iter().find(|(y, _)| *y == 0).unwrap();
        assert_eq!(row0.1, alloc::vec![0, 10, 20, 30]);
    }

    #[test]
    fn offset_is_its_own_inverse() {
        let mut a = rect(0, 20, 10, 30);
        let original = a.clone();
        a.offset(7, -3);
        a.offset(-7, 3);
        assert_eq!(a.bbox, original.bbox);
    }

    #[test]
    fn union_self_is_identity() {
        let a = rect(3, 4, 12, 20);
        let u = union(&a, &a);
        assert_eq!(u.bbox, a.bbox);
        assert_eq!(u.is_rectangular(), a.is_rectangular());
    }

    #[test]
    fn intersect_self_is_identity_and_difference_self_is_empty() {
        let a = rect(3, 4, 12, 20);
        assert_eq!(intersect(&a, &a).bbox, a.bbox);
        assert!(difference(&a, &a).is_empty());
    }

    #[test]
    fn intersect_distributes_over_union() {
        let a = rect(0, 0, 20, 20);
        let b = rect(0, 0, 10, 10);
        let c = rect(10, 10, 20, 20);
        let lhs = intersect(&a, &union(&b, &c));
        let rhs = union(&intersect(&a, &b), &intersect(&a, &c));
        assert_eq!(lhs.bbox, rhs.bbox);
        for y in lhs.bbox.top..lhs.bbox.bottom {
            for x in lhs.bbox.left..lhs.bbox.right {
                let p = Point::new(x, y);
                assert_eq!(lhs.point_in(p), rhs.point_in(p));
            }
        }
    }
}
