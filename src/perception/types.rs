// Screenshots, text detections and screen geometry.
use serde::{Deserialize, Serialize};

/// Axis-aligned box in physical pixels: `[xmin, ymin, xmax, ymax]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    /// Box of the given size centred on `center`.
    pub fn around(center: (i32, i32), width: i32, height: i32) -> Self {
        let (cx, cy) = center;
        Self::new(cx - width / 2, cy - height / 2, cx + width / 2, cy + height / 2)
    }

    /// Degenerate box for a bare point.
    pub fn point(center: (i32, i32)) -> Self {
        Self::new(center.0, center.1, center.0, center.1)
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.x_min + self.x_max) / 2, (self.y_min + self.y_max) / 2)
    }

    pub fn width(&self) -> i32 {
        (self.x_max - self.x_min).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y_max - self.y_min).max(0)
    }
}

/// Position on the resolution-independent 0–1000 grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: u32,
    pub y: u32,
}

impl NormalizedPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub monitor_index: u32,
    pub scale_factor: f64,
    pub physical_width: u32,
    pub physical_height: u32,
}

impl ScreenshotMeta {
    pub fn with_size(physical_width: u32, physical_height: u32) -> Self {
        Self {
            monitor_index: 0,
            scale_factor: 1.0,
            physical_width,
            physical_height,
        }
    }
}

/// One captured frame. `image_bytes` holds an encoded image (PNG).
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image_bytes: Vec<u8>,
    pub meta: ScreenshotMeta,
}

impl Screenshot {
    pub fn new(image_bytes: Vec<u8>, meta: ScreenshotMeta) -> Self {
        Self { image_bytes, meta }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.meta.physical_width, self.meta.physical_height)
    }
}

/// A piece of text found on screen by a [`TextDetector`](super::traits::TextDetector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    pub text: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub center: (i32, i32),
}

impl TextDetection {
    pub fn new(text: impl Into<String>, confidence: f32, center: (i32, i32)) -> Self {
        let text = text.into();
        // Approximate extent for detectors that only report a centre point.
        let width = (text.chars().count() as i32 * 8).max(20);
        Self {
            bbox: BoundingBox::around(center, width, 16),
            text,
            confidence,
            center,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }
}
