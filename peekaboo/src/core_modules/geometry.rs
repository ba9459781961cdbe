// THEORY:
// The `geometry` module holds the small set of screen-space primitives that every
// other layer of the engine speaks in. Positions are kept as `f64` so that the slow,
// sub-pixel pursuit of the motion engine accumulates instead of being rounded away
// on every tick; window backends round when they hand a rectangle to the OS.
//
// The overlap test is strict: two rectangles that merely share an edge have zero
// intersection area and therefore do not collide.

use serde::{Deserialize, Serialize};

/// A point in screen coordinates (pixels, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A width/height pair, used for both the screen and popup dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Pixel dimensions for decoders, never smaller than 1x1.
    pub fn pixels(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }

    /// The largest top-left coordinate a rectangle of `inner` size can take while
    /// staying on a surface of this size. Collapses to zero when `inner` is bigger.
    pub fn max_origin(&self, inner: Size) -> Point {
        Point {
            x: (self.width - inner.width).max(0.0),
            y: (self.height - inner.height).max(0.0),
        }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_origin(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// True when both axes overlap with positive extent.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Horizontal and vertical overlap lengths, or `None` if the rectangles do not
    /// intersect.
    pub fn overlap_extents(&self, other: &Rect) -> Option<(f64, f64)> {
        if !self.intersects(other) {
            return None;
        }
        let horizontal = self.right().min(other.right()) - self.x.max(other.x);
        let vertical = self.bottom().min(other.bottom()) - self.y.max(other.y);
        Some((horizontal, vertical))
    }

    /// Clamps the position so the rectangle lies inside `[0, screen]`. When the
    /// rectangle is larger than the screen on an axis it is pinned to 0 on that axis.
    pub fn clamped_within(&self, screen: Size) -> Self {
        let max = screen.max_origin(self.size());
        Self::new(
            self.x.clamp(0.0, max.x),
            self.y.clamp(0.0, max.y),
            self.width,
            self.height,
        )
    }

    /// True when the rectangle lies fully on a screen of the given size.
    pub fn is_within(&self, screen: Size) -> bool {
        let max = screen.max_origin(self.size());
        self.x >= 0.0 && self.y >= 0.0 && self.x <= max.x && self.y <= max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(100.0, 0.0, 50.0, 50.0);
        assert!(!a.intersects(&b));
        assert_eq!(a.overlap_extents(&b), None);
    }

    #[test]
    fn overlap_requires_both_axes() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let beside = Rect::new(50.0, 200.0, 100.0, 100.0);
        assert!(!a.intersects(&beside));

        let b = Rect::new(80.0, 60.0, 100.0, 100.0);
        assert_eq!(a.overlap_extents(&b), Some((20.0, 40.0)));
        assert_eq!(b.overlap_extents(&a), Some((20.0, 40.0)));
    }

    #[test]
    fn clamp_keeps_rect_on_screen() {
        let screen = Size::new(800.0, 600.0);
        let r = Rect::new(-40.0, 590.0, 200.0, 100.0).clamped_within(screen);
        assert_eq!(r, Rect::new(0.0, 500.0, 200.0, 100.0));
        assert!(r.is_within(screen));

        let oversized = Rect::new(30.0, 30.0, 1000.0, 100.0).clamped_within(screen);
        assert_eq!(oversized.x, 0.0);
    }
}
