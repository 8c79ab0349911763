#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};

/// A point in viewport or page space, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate by `delta`.
    #[must_use]
    pub fn offset(self, delta: Point) -> Self {
        Self { x: self.x + delta.x, y: self.y + delta.y }
    }

    /// Round both coordinates to the nearest whole pixel.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self { x: self.x.round(), y: self.y.round() }
    }
}

/// Axis-aligned bounding box in viewport space.
///
/// `x` / `y` are the left/top edges; `width` / `height` are never negative
/// for boxes produced by a well-behaved document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Inclusive on the left/top edge, exclusive on the right/bottom edge.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.x + self.width && point.y >= self.y && point.y < self.y + self.height
    }

    #[must_use]
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Express `point` as fractions of this box's width and height.
    ///
    /// Returns `None` for a zero-area box.
    #[must_use]
    pub fn fraction_of(&self, point: Point) -> Option<Point> {
        if !self.has_area() {
            return None;
        }
        Some(Point { x: (point.x - self.x) / self.width, y: (point.y - self.y) / self.height })
    }

    /// Inverse of [`Rect::fraction_of`]: the viewport point at `fraction`.
    #[must_use]
    pub fn point_at(&self, fraction: Point) -> Point {
        Point { x: self.x + self.width * fraction.x, y: self.y + self.height * fraction.y }
    }
}
