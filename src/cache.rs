use image::GrayImage;
use log::debug;

use crate::error::{Error, Result};
use crate::pixel_format::{self, PixelBuffer};

/// Holds the most recently converted image so repeated calls on the same picture
/// don't pay for the conversion again.
#[derive(Debug, Default)]
pub struct ImageCache {
    current: Option<GrayImage>
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `buffer` into the cache, or reuse the cached image when `buffer` is the
    /// empty sentinel.
    ///
    /// A failed conversion leaves the previously cached image in place.
    pub fn ingest(&mut self, buffer: &PixelBuffer<'_>) -> Result<&GrayImage> {
        if buffer.is_empty() {
            debug!("empty buffer, reusing cached image");
            return self.current.as_ref().ok_or(Error::NoImage);
        }

        let image = pixel_format::convert(buffer)?;
        Ok(&*self.current.insert(image))
    }

    pub fn current(&self) -> Option<&GrayImage> {
        self.current.as_ref()
    }
}
