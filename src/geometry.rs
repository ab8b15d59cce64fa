//! Small geometry helpers shared by the layout model and the engine.
//!
//! Touch coordinates are normalized to `[0, 1]` with the origin at the
//! top-left of each side's surface. Distance thresholds in the config are
//! physical millimeters, so conversions go through [`PadDimensions`].

use serde::{Deserialize, Serialize};

/// Physical size of one trackpad surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PadDimensions {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl Default for PadDimensions {
    fn default() -> Self {
        // Apple Magic Trackpad 2 footprint.
        Self {
            width_mm: 160.0,
            height_mm: 114.9,
        }
    }
}

/// A point in normalized surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Physical distance to another normalized point, in millimeters.
    pub fn distance_mm(&self, other: Point, dims: PadDimensions) -> f32 {
        let dx = (self.x - other.x) * dims.width_mm;
        let dy = (self.y - other.y) * dims.height_mm;
        (dx * dx + dy * dy).sqrt()
    }

    /// Squared physical distance, for comparisons that avoid the sqrt.
    pub fn distance_sq_mm(&self, other: Point, dims: PadDimensions) -> f32 {
        let dx = (self.x - other.x) * dims.width_mm;
        let dy = (self.y - other.y) * dims.height_mm;
        dx * dx + dy * dy
    }
}

/// An axis-aligned rectangle in normalized surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Distance from an interior point to the nearest edge. Larger means
    /// more interior; used to break ties between overlapping rects.
    pub fn min_edge_distance(&self, p: Point) -> f32 {
        let left = p.x - self.x;
        let right = self.x + self.w - p.x;
        let top = p.y - self.y;
        let bottom = self.y + self.h - p.y;
        left.min(right).min(top).min(bottom)
    }

    /// Distance from an arbitrary point to the rect boundary (zero inside).
    pub fn edge_distance(&self, p: Point) -> f32 {
        let dx = (self.x - p.x).max(p.x - (self.x + self.w)).max(0.0);
        let dy = (self.y - p.y).max(p.y - (self.y + self.h)).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_half_open() {
        let r = Rect::new(0.25, 0.25, 0.5, 0.5);
        assert!(r.contains(Point::new(0.25, 0.25)));
        assert!(r.contains(Point::new(0.5, 0.5)));
        assert!(!r.contains(Point::new(0.75, 0.5)));
        assert!(!r.contains(Point::new(0.5, 0.75)));
    }

    #[test]
    fn min_edge_distance_prefers_interior() {
        let r = Rect::new(0.0, 0.0, 1.0, 1.0);
        assert!(r.min_edge_distance(Point::new(0.5, 0.5)) > r.min_edge_distance(Point::new(0.1, 0.5)));
    }

    #[test]
    fn edge_distance_zero_inside() {
        let r = Rect::new(0.2, 0.2, 0.2, 0.2);
        assert_eq!(r.edge_distance(Point::new(0.3, 0.3)), 0.0);
        assert!(r.edge_distance(Point::new(0.5, 0.3)) > 0.0);
    }

    #[test]
    fn distance_mm_scales_by_pad_size() {
        let dims = PadDimensions {
            width_mm: 100.0,
            height_mm: 50.0,
        };
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.1, 0.0);
        assert!((a.distance_mm(b, dims) - 10.0).abs() < 1e-4);
        let c = Point::new(0.0, 0.1);
        assert!((a.distance_mm(c, dims) - 5.0).abs() < 1e-4);
    }
}
