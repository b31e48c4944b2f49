//! Wall-space geometry.
//!
//! Coordinates are integer wall pixels with the origin at the bottom-left of
//! the wall, so `y` grows upward and a rectangle's `top` is never below its
//! `bottom`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in wall pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate (grows upward).
    pub y: i32,
}

impl Point {
    /// The origin.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create a new point.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Component-wise offset, saturating at the `i32` range.
    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in wall pixel space.
///
/// Invariants: `right >= left` and `top >= bottom`. Every constructor
/// normalizes its input so the invariants hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Create bounds from the four edges, swapping edges given in the wrong order.
    pub fn new(left: i32, right: i32, top: i32, bottom: i32) -> Self {
        Self {
            left: left.min(right),
            right: left.max(right),
            top: top.max(bottom),
            bottom: top.min(bottom),
        }
    }

    /// Create bounds from a bottom-left origin and a size.
    pub fn from_origin_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, x + width, y + height, y)
    }

    /// Create bounds centered on a point.
    pub fn centered_at(center: Point, width: i32, height: i32) -> Self {
        let left = center.x - width / 2;
        let bottom = center.y - height / 2;
        Self::from_origin_size(left, bottom, width, height)
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.top - self.bottom
    }

    /// Area in square pixels.
    #[inline]
    pub fn area(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }

    /// Center point, rounded toward the bottom-left.
    pub fn center(&self) -> Point {
        Point::new(
            self.left + self.width() / 2,
            self.bottom + self.height() / 2,
        )
    }

    /// Aspect ratio (width / height), or 0 for degenerate bounds.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height() == 0 {
            0.0
        } else {
            f64::from(self.width()) / f64::from(self.height())
        }
    }

    /// Point containment, inclusive on all four edges.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.left <= x && x <= self.right && self.bottom <= y && y <= self.top
    }

    /// Point containment against the ellipse inscribed in these bounds.
    ///
    /// Used by round widgets so that corners do not capture the pointer.
    pub fn contains_round(&self, x: i32, y: i32) -> bool {
        if !self.contains(x, y) {
            return false;
        }
        let rx = f64::from(self.width()) / 2.0;
        let ry = f64::from(self.height()) / 2.0;
        if rx == 0.0 || ry == 0.0 {
            return true;
        }
        let cx = f64::from(self.left) + rx;
        let cy = f64::from(self.bottom) + ry;
        let nx = (f64::from(x) - cx) / rx;
        let ny = (f64::from(y) - cy) / ry;
        nx * nx + ny * ny <= 1.0
    }

    /// Strict rectangle intersection. Rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.bottom < other.top
            && other.bottom < self.top
    }

    /// Euclidean distance from a point to the nearest edge or corner; 0 inside.
    pub fn distance(&self, x: i32, y: i32) -> f64 {
        let gap = |v: i32, lo: i32, hi: i32| {
            if v < lo {
                f64::from(lo) - f64::from(v)
            } else if v > hi {
                f64::from(v) - f64::from(hi)
            } else {
                0.0
            }
        };
        gap(x, self.left, self.right).hypot(gap(y, self.bottom, self.top))
    }

    /// Bounds spanning both corners of a drag gesture.
    pub fn spanning(a: Point, b: Point) -> Self {
        Self::new(a.x, b.x, a.y, b.y)
    }

    /// Move the bounds by an offset.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            left: self.left.saturating_add(dx),
            right: self.right.saturating_add(dx),
            top: self.top.saturating_add(dy),
            bottom: self.bottom.saturating_add(dy),
        }
    }

    /// Map a normalized `(0..1, 0..1)` position into these bounds.
    ///
    /// Out-of-range input saturates rather than wrapping.
    pub fn denormalize(&self, nx: f64, ny: f64) -> Point {
        let x = ((nx * f64::from(self.width())).round() as i32).saturating_add(self.left);
        let y = ((ny * f64::from(self.height())).round() as i32).saturating_add(self.bottom);
        Point::new(x, y)
    }

    /// Clamp a point to lie within these bounds.
    pub fn clamp(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.left, self.right),
            p.y.clamp(self.bottom, self.top),
        )
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[L={} R={} T={} B={}]",
            self.left, self.right, self.top, self.bottom
        )
    }
}
