//! Conversion from caller-supplied rasters to the canonical grayscale image.
//!
//! Callers hand over pixels column-major (the row index varies fastest), either as a
//! single grayscale plane or as three colour planes stored one after another in R, G, B
//! order. Everything downstream works on a row-major [`GrayImage`].

use image::{GrayImage, RgbImage};
use log::debug;

use crate::error::{Error, Result};

/// A borrowed, column-major pixel buffer in the caller's layout.
///
/// A buffer with both dimensions zero is the "no new image" sentinel: it asks the
/// session to reuse whatever image it already holds.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    pub data: &'a [u8],
    pub height: u32,
    pub width: u32,
    pub channels: usize
}

impl<'a> PixelBuffer<'a> {
    pub fn new(data: &'a [u8], height: u32, width: u32, channels: usize) -> Self {
        Self {
            data, height, width, channels
        }
    }

    pub fn gray(data: &'a [u8], height: u32, width: u32) -> Self {
        Self::new(data, height, width, 1)
    }

    pub fn rgb(data: &'a [u8], height: u32, width: u32) -> Self {
        Self::new(data, height, width, 3)
    }

    /// The sentinel buffer that reuses the cached image.
    pub fn empty() -> PixelBuffer<'static> {
        PixelBuffer {
            data: &[],
            height: 0,
            width: 0,
            channels: 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 && self.width == 0
    }
}

/// Convert a caller buffer into the canonical row-major grayscale image.
///
/// Grayscale buffers are copied sample for sample. RGB buffers are reduced with the plain
/// channel average `(r + g + b) / 3`, truncated, rather than a luma-weighted formula.
pub fn convert(buffer: &PixelBuffer<'_>) -> Result<GrayImage> {
    if buffer.channels != 1 && buffer.channels != 3 {
        return Err(Error::UnsupportedChannelCount(buffer.channels));
    }

    if buffer.height == 0 || buffer.width == 0 {
        return Err(Error::DegenerateImage {
            height: buffer.height as usize,
            width: buffer.width as usize
        });
    }

    let height = buffer.height as usize;
    let sizes = height
        .checked_mul(buffer.width as usize)
        .and_then(|plane| plane.checked_mul(buffer.channels).map(|expected| (plane, expected)));

    let plane = match sizes {
        Some((plane, expected)) if buffer.data.len() == expected => plane,
        // A size that does not fit in `usize` can never match the buffer.
        _ => {
            return Err(Error::BufferSizeMismatch {
                expected: sizes.map_or(usize::MAX, |(_, expected)| expected),
                actual: buffer.data.len()
            });
        }
    };

    debug!("converting {}x{} buffer with {} channel(s)", buffer.height, buffer.width, buffer.channels);

    let data = buffer.data;

    let image = if buffer.channels == 1 {
        GrayImage::from_fn(buffer.width, buffer.height, |x, y| {
            image::Luma([data[x as usize * height + y as usize]])
        })
    } else {
        let (red, rest) = data.split_at(plane);
        let (green, blue) = rest.split_at(plane);

        GrayImage::from_fn(buffer.width, buffer.height, |x, y| {
            let i = x as usize * height + y as usize;
            let sum = u16::from(red[i]) + u16::from(green[i]) + u16::from(blue[i]);
            image::Luma([(sum / 3) as u8])
        })
    };

    Ok(image)
}

/// Lay out a grayscale image the way callers supply it: a single column-major plane.
pub fn column_major_from_gray(image: &GrayImage) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity(width as usize * height as usize);

    for x in 0 .. width {
        for y in 0 .. height {
            data.push(image.get_pixel(x, y)[0]);
        }
    }

    data
}

/// Lay out an RGB image the way callers supply it: three column-major planes, R then G then B.
pub fn planar_column_major_from_rgb(image: &RgbImage) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity(3 * width as usize * height as usize);

    for channel in 0 .. 3 {
        for x in 0 .. width {
            for y in 0 .. height {
                data.push(image.get_pixel(x, y)[channel]);
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_is_a_storage_transpose() {
        // 2 rows, 3 columns, column-major: column 0 = [1, 4], column 1 = [2, 5], column 2 = [3, 6]
        let data = [1, 4, 2, 5, 3, 6];
        let image = convert(&PixelBuffer::gray(&data, 2, 3)).unwrap();

        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.as_raw(), &vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(image.get_pixel(2, 1)[0], 6);
    }

    #[test]
    fn rgb_average_truncates() {
        let data = [10, 10, 11];
        let image = convert(&PixelBuffer::rgb(&data, 1, 1)).unwrap();
        assert_eq!(image.get_pixel(0, 0)[0], 10);

        let data = [255, 255, 254];
        let image = convert(&PixelBuffer::rgb(&data, 1, 1)).unwrap();
        assert_eq!(image.get_pixel(0, 0)[0], 254);
    }

    #[test]
    fn rgb_planes_follow_pixel_positions() {
        let mut rgb = RgbImage::new(3, 2);
        for (x, y, pixel) in rgb.enumerate_pixels_mut() {
            let v = (10 * y + x) as u8;
            *pixel = Rgb([v, v * 2, v * 3]);
        }

        let data = planar_column_major_from_rgb(&rgb);
        let image = convert(&PixelBuffer::rgb(&data, 2, 3)).unwrap();

        for (x, y, pixel) in image.enumerate_pixels() {
            let v = (10 * y + x) as u8;
            assert_eq!(pixel[0], ((u16::from(v) * 6) / 3) as u8);
        }
    }

    #[test]
    fn gray_helper_matches_converter() {
        let image = GrayImage::from_fn(5, 4, |x, y| image::Luma([(x * 7 + y * 13) as u8]));
        let data = column_major_from_gray(&image);
        assert_eq!(convert(&PixelBuffer::gray(&data, 4, 5)).unwrap(), image);
    }

    #[test]
    fn unsupported_channel_count() {
        let data = [0; 8];
        match convert(&PixelBuffer::new(&data, 2, 2, 2)) {
            Err(Error::UnsupportedChannelCount(2)) => {},
            other => panic!("unexpected result {:?}", other)
        }
    }

    #[test]
    fn size_mismatch() {
        let data = [0; 5];
        match convert(&PixelBuffer::gray(&data, 2, 3)) {
            Err(Error::BufferSizeMismatch { expected: 6, actual: 5 }) => {},
            other => panic!("unexpected result {:?}", other)
        }
    }

    #[test]
    fn overflowing_size() {
        match convert(&PixelBuffer::rgb(&[1, 2, 3], u32::MAX, u32::MAX)) {
            Err(Error::BufferSizeMismatch { expected: usize::MAX, actual: 3 }) => {},
            other => panic!("unexpected result {:?}", other)
        }
    }

    #[test]
    fn single_zero_dimension_is_degenerate() {
        match convert(&PixelBuffer::gray(&[], 0, 4)) {
            Err(Error::DegenerateImage { height: 0, width: 4 }) => {},
            other => panic!("unexpected result {:?}", other)
        }
    }
}
