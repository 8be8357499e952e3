use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Whether the rect overlaps the `[0, width] x [0, height]` viewport box.
    pub fn intersects_viewport(&self, viewport: &Viewport) -> bool {
        self.x < viewport.width
            && self.y < viewport.height
            && self.x + self.width > 0.0
            && self.y + self.height > 0.0
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_intersection() {
        let viewport = Viewport::default();
        assert!(ElementRect::new(10.0, 10.0, 50.0, 20.0).intersects_viewport(&viewport));
        assert!(ElementRect::new(-40.0, 10.0, 50.0, 20.0).intersects_viewport(&viewport));
        assert!(!ElementRect::new(10.0, 800.0, 50.0, 20.0).intersects_viewport(&viewport));
        assert!(!ElementRect::new(-60.0, 10.0, 50.0, 20.0).intersects_viewport(&viewport));
    }

    #[test]
    fn test_offset_keeps_size() {
        let rect = ElementRect::new(10.0, 10.0, 80.0, 30.0).offset(100.0, 50.0);
        assert_eq!(rect, ElementRect::new(110.0, 60.0, 80.0, 30.0));
    }
}
