use image::GenericImageView;

use crate::Vector2;

/// A rectangle in the image.
///
/// Corners are inclusive pixel coordinates, so a rectangle covering a single pixel
/// has `left == right` and `top == bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rectangle {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64
}

impl Rectangle {
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left, top, right, bottom
        }
    }

    /// Create a rectangle from its top-left corner and size, as reported by most detectors.
    pub fn from_xywh(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self::new(x, y, x + width - 1, y + height - 1)
    }

    /// Create a rectangle the same size as an image.
    pub fn from_image<I: GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self::from_xywh(0, 0, i64::from(width), i64::from(height))
    }

    pub fn width(&self) -> i64 {
        if self.is_empty() { 0 } else { self.right - self.left + 1 }
    }

    pub fn height(&self) -> i64 {
        if self.is_empty() { 0 } else { self.bottom - self.top + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.top > self.bottom
    }

    /// The `[left, top, right, bottom]` row of a detection table.
    pub fn ltrb(&self) -> [i64; 4] {
        [self.left, self.top, self.right, self.bottom]
    }

    pub fn tl_corner(&self) -> Vector2 {
        Vector2::new(self.left as f32, self.top as f32)
    }

    pub fn tr_corner(&self) -> Vector2 {
        Vector2::new(self.right as f32, self.top as f32)
    }

    pub fn br_corner(&self) -> Vector2 {
        Vector2::new(self.right as f32, self.bottom as f32)
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.left && y >= self.top && x <= self.right && y <= self.bottom
    }
}
