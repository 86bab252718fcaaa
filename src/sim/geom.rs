//! Rectangles, bounds and sides
//!
//! All coordinates are screen-style: x grows to the right, y grows downward.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Side of a rectangle hit during a collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Top => Side::Bottom,
            Side::Right => Side::Left,
            Side::Bottom => Side::Top,
            Side::Left => Side::Right,
        }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Same rectangle shifted by `offset`
    pub fn translated(&self, offset: Vec2) -> Self {
        Self::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    /// Half-open point containment. Rectangles with a negative dimension
    /// contain nothing.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        if self.width < 0.0 || self.height < 0.0 {
            return false;
        }
        px >= self.x && py >= self.y && px < self.right() && py < self.bottom()
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.contains(point.x, point.y)
    }

    /// Open-interval AABB overlap. Touching edges do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Overlapping area; empty (zero sized) when the rectangles are apart
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(x, y, (right - x).max(0.0), (bottom - y).max(0.0))
    }

    /// Side of `other` that `self` touches, e.g. `Left` when `self` sits
    /// against `other`'s left edge.
    ///
    /// Compares the center delta against the summed half extents (a Minkowski
    /// sum). On a corner hit the sign test `cross_width > -cross_height` picks
    /// the winning axis.
    pub fn intersects_at(&self, other: &Rect) -> Option<Side> {
        let delta = self.center() - other.center();
        let half_w = (self.width + other.width) / 2.0;
        let half_h = (self.height + other.height) / 2.0;

        if delta.x.abs() > half_w || delta.y.abs() > half_h {
            return None;
        }

        let cross_width = half_w * delta.y;
        let cross_height = half_h * delta.x;

        let side = if cross_width > cross_height {
            if cross_width > -cross_height {
                Side::Bottom
            } else {
                Side::Left
            }
        } else if cross_width > -cross_height {
            Side::Right
        } else {
            Side::Top
        };
        Some(side)
    }
}

/// Four edges constraining a node position, in its container's space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Bounds {
    pub const fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Edges of `rect`. `absolute` drops the origin, giving the rectangle's
    /// own local space.
    pub fn from_rect(rect: &Rect, absolute: bool) -> Self {
        if absolute {
            Self::new(0.0, rect.width, rect.height, 0.0)
        } else {
            Self::new(rect.y, rect.right(), rect.bottom(), rect.x)
        }
    }

    /// Clamp each axis independently
    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.max(self.left).min(self.right),
            y.max(self.top).min(self.bottom),
        )
    }

    /// Whether a position lies outside the edges (inclusive edges count as inside)
    pub fn excludes(&self, x: f32, y: f32) -> bool {
        y < self.top || x < self.left || y > self.bottom || x > self.right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_contains_is_half_open() {
        let r = Rect::new(10.0, 10.0, 5.0, 5.0);
        assert!(r.contains(10.0, 10.0));
        assert!(r.contains(14.9, 14.9));
        assert!(!r.contains(15.0, 12.0));
        assert!(!Rect::new(0.0, 0.0, -1.0, 5.0).contains(-0.5, 1.0));
    }

    #[test]
    fn test_touching_rects_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Rect::new(9.0, 9.0, 2.0, 2.0)));
    }

    #[test]
    fn test_intersection_area() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 6.0, 10.0, 10.0);
        assert_eq!(a.intersection(&b), Rect::new(5.0, 6.0, 5.0, 4.0));
        let apart = a.intersection(&Rect::new(50.0, 50.0, 1.0, 1.0));
        assert_eq!(apart.width, 0.0);
        assert_eq!(apart.height, 0.0);
    }

    #[test]
    fn test_intersects_at_sides() {
        let wall = Rect::new(100.0, 100.0, 40.0, 40.0);
        // A mover overlapping the wall from the left sits left of it
        let from_left = Rect::new(70.0, 110.0, 32.0, 16.0);
        assert_eq!(from_left.intersects_at(&wall), Some(Side::Left));
        let from_right = Rect::new(138.0, 110.0, 16.0, 16.0);
        assert_eq!(from_right.intersects_at(&wall), Some(Side::Right));
        let from_above = Rect::new(110.0, 86.0, 16.0, 16.0);
        assert_eq!(from_above.intersects_at(&wall), Some(Side::Top));
        let from_below = Rect::new(110.0, 138.0, 16.0, 16.0);
        assert_eq!(from_below.intersects_at(&wall), Some(Side::Bottom));
        assert_eq!(Rect::new(0.0, 0.0, 4.0, 4.0).intersects_at(&wall), None);
    }

    #[test]
    fn test_bounds_from_rect() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(Bounds::from_rect(&r, false), Bounds::new(20.0, 40.0, 60.0, 10.0));
        assert_eq!(Bounds::from_rect(&r, true), Bounds::new(0.0, 30.0, 40.0, 0.0));
    }

    #[test]
    fn test_bounds_excludes_uses_position_only() {
        let b = Bounds::new(0.0, 100.0, 100.0, 0.0);
        assert!(!b.excludes(100.0, 100.0));
        assert!(b.excludes(100.5, 0.0));
        assert!(b.excludes(0.0, -0.1));
    }

    fn rect_strategy() -> impl Strategy<Value = Rect> {
        (-200.0f32..200.0, -200.0f32..200.0, 0.0f32..100.0, 0.0f32..100.0)
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn test_intersects_is_symmetric(a in rect_strategy(), b in rect_strategy()) {
            prop_assert_eq!(a.intersects(&b), b.intersects(&a));
        }

        #[test]
        fn test_intersects_at_is_deterministic(a in rect_strategy(), b in rect_strategy()) {
            let first = a.intersects_at(&b);
            prop_assert_eq!(first, a.intersects_at(&b));
            if a.intersects(&b) {
                prop_assert!(first.is_some());
            }
        }

        #[test]
        fn test_clamp_stays_inside(
            x in -500.0f32..500.0,
            y in -500.0f32..500.0,
            left in -100.0f32..0.0,
            top in -100.0f32..0.0,
            w in 0.0f32..200.0,
            h in 0.0f32..200.0,
        ) {
            let b = Bounds::new(top, left + w, top + h, left);
            let (cx, cy) = b.clamp(x, y);
            prop_assert!(cx >= b.left && cx <= b.right);
            prop_assert!(cy >= b.top && cy <= b.bottom);
            if !b.excludes(x, y) {
                prop_assert_eq!((cx, cy), (x, y));
            }
        }
    }
}
