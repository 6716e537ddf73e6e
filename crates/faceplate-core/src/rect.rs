use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Integral axis-aligned rectangle in pixel space, top-left origin.
///
/// Covers columns `x..x + width` and rows `y..y + height` (exclusive ends).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Round float bounds `[x0, x1) x [y0, y1)` to pixels and clamp them into
    /// `[0, bounds_w) x [0, bounds_h)`.
    ///
    /// Returns `None` when nothing of the rectangle is left inside the bounds.
    pub fn from_bounds_clamped(
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        bounds_w: u32,
        bounds_h: u32,
    ) -> Option<Self> {
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return None;
        }
        let xa = x0.round().clamp(0.0, bounds_w as f32) as u32;
        let xb = x1.round().clamp(0.0, bounds_w as f32) as u32;
        let ya = y0.round().clamp(0.0, bounds_h as f32) as u32;
        let yb = y1.round().clamp(0.0, bounds_h as f32) as u32;
        if xb <= xa || yb <= ya {
            return None;
        }
        Some(Self::new(xa, ya, xb - xa, yb - ya))
    }

    /// Square around a circle, clamped into the bounds.
    pub fn around_circle(
        center: Point2<f32>,
        radius: f32,
        bounds_w: u32,
        bounds_h: u32,
    ) -> Option<Self> {
        Self::from_bounds_clamped(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
            bounds_w,
            bounds_h,
        )
    }

    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(
            self.x as f32 + 0.5 * self.width as f32,
            self.y as f32 + 0.5 * self.height as f32,
        )
    }

    pub fn intersection_area(&self, other: &PixelRect) -> u64 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        (x1 - x0) as u64 * (y1 - y0) as u64
    }

    /// Intersection over union, `0.0` for two empty rectangles.
    pub fn iou(&self, other: &PixelRect) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union == 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }

    pub fn contains_point(&self, p: Point2<f32>) -> bool {
        self.inset_contains(0.0, p)
    }

    /// Whether `p` lies inside the rectangle shrunk by `frac` of its width and
    /// height on every side.
    pub fn inset_contains(&self, frac: f32, p: Point2<f32>) -> bool {
        let dx = frac * self.width as f32;
        let dy = frac * self.height as f32;
        p.x >= self.x as f32 + dx
            && p.x <= self.right() as f32 - dx
            && p.y >= self.y as f32 + dy
            && p.y <= self.bottom() as f32 - dy
    }

    pub fn is_within(&self, bounds_w: u32, bounds_h: u32) -> bool {
        self.width > 0 && self.height > 0 && self.right() <= bounds_w && self.bottom() <= bounds_h
    }

    /// Clip into `[0, bounds_w) x [0, bounds_h)`.
    pub fn clamped(&self, bounds_w: u32, bounds_h: u32) -> Option<Self> {
        Self::from_bounds_clamped(
            self.x as f32,
            self.y as f32,
            self.right() as f32,
            self.bottom() as f32,
            bounds_w,
            bounds_h,
        )
    }

    /// Shift by whole pixels, keeping the size when it fits inside the bounds.
    pub fn translated_clamped(&self, dx: i32, dy: i32, bounds_w: u32, bounds_h: u32) -> Self {
        let max_x = bounds_w.saturating_sub(self.width) as i64;
        let max_y = bounds_h.saturating_sub(self.height) as i64;
        let x = (self.x as i64 + dx as i64).clamp(0, max_x) as u32;
        let y = (self.y as i64 + dy as i64).clamp(0, max_y) as u32;
        Self::new(x, y, self.width.min(bounds_w), self.height.min(bounds_h))
    }
}
