//! Decoded images and everything needed to produce them.
//!
//! Decoding always ends in a [`PixelBuffer`]: tightly described 8-bit RGB or RGBA rows that
//! can be uploaded to a texture. Images are shrunk to fit the requested [`Bounds`] while they
//! are decoded, and their embedded orientation is applied afterwards.

use std::fmt;

use image::{DynamicImage, RgbImage, RgbaImage};

use crate::caching::{CacheEntry, CacheError};

mod data_uri;
mod decoder;
mod load;

pub use data_uri::*;
pub use decoder::*;
pub use load::*;

/// Decoded 8-bit pixels, either RGB or RGBA.
///
/// Rows are `rowstride` bytes apart; everything past `width` pixels within a row is padding.
/// Equality compares dimensions, layout and bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    rowstride: usize,
    has_alpha: bool,
    data: Vec<u8>,
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rowstride", &self.rowstride)
            .field("has_alpha", &self.has_alpha)
            .finish_non_exhaustive()
    }
}

impl PixelBuffer {
    /// Wraps raw pixel `data`, checking that it covers all rows.
    pub fn new(
        width: u32,
        height: u32,
        rowstride: usize,
        has_alpha: bool,
        data: Vec<u8>,
    ) -> CacheEntry<Self> {
        let malformed = || {
            CacheError::Malformed(format!(
                "{} bytes of pixel data for {width}x{height}, rowstride {rowstride}",
                data.len()
            ))
        };
        let channels: usize = if has_alpha { 4 } else { 3 };
        let row_len = (width as usize).checked_mul(channels).ok_or_else(malformed)?;
        let required = match height {
            0 => Some(0),
            h => rowstride
                .checked_mul(h as usize - 1)
                .and_then(|rows| rows.checked_add(row_len)),
        };
        match required {
            Some(required) if rowstride >= row_len && data.len() >= required => {}
            _ => return Err(malformed()),
        }

        Ok(Self {
            width,
            height,
            rowstride,
            has_alpha,
            data,
        })
    }

    /// Converts a decoded image, keeping the alpha channel only if the image has one.
    pub fn from_image(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        if image.color().has_alpha() {
            Self {
                width,
                height,
                rowstride: width as usize * 4,
                has_alpha: true,
                data: image.into_rgba8().into_raw(),
            }
        } else {
            Self {
                width,
                height,
                rowstride: width as usize * 3,
                has_alpha: false,
                data: image.into_rgb8().into_raw(),
            }
        }
    }

    /// Converts back into an [`image`] buffer for further processing.
    pub fn to_image(&self) -> DynamicImage {
        let packed = self.packed_data();
        let (width, height) = (self.width, self.height);
        let image = if self.has_alpha {
            RgbaImage::from_raw(width, height, packed).map(DynamicImage::ImageRgba8)
        } else {
            RgbImage::from_raw(width, height, packed).map(DynamicImage::ImageRgb8)
        };
        // `packed_data` always yields exactly `width * height` pixels
        image.unwrap_or_else(|| DynamicImage::new_rgba8(width, height))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rowstride(&self) -> usize {
        self.rowstride
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn n_channels(&self) -> usize {
        if self.has_alpha { 4 } else { 3 }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The pixel rows without any row padding.
    fn packed_data(&self) -> Vec<u8> {
        let row_len = self.width as usize * self.n_channels();
        if self.rowstride == row_len {
            let mut data = self.data.clone();
            data.truncate(row_len * self.height as usize);
            return data;
        }
        (0..self.height as usize)
            .flat_map(|y| &self.data[y * self.rowstride..y * self.rowstride + row_len])
            .copied()
            .collect()
    }

    /// Copies out the given rectangle, which is clamped to the buffer.
    pub fn region(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);

        let channels = self.n_channels();
        let row_len = width as usize * channels;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = row * self.rowstride + x as usize * channels;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Self {
            width,
            height,
            rowstride: row_len,
            has_alpha: self.has_alpha,
            data,
        }
    }
}

/// The space available to a decoded image. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Bounds {
    /// No limit in either dimension.
    pub const UNBOUNDED: Self = Self {
        width: None,
        height: None,
    };

    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self { width, height }
    }

    /// A `size`x`size` square.
    pub fn square(size: u32) -> Self {
        Self::new(Some(size), Some(size))
    }

    /// The same bounds with width and height exchanged.
    pub fn swapped(self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// Computes the size a `width`x`height` image should be decoded at to fit `bounds`.
///
/// The aspect ratio is preserved. Returns `None` if the image already fits, as images are
/// never scaled up, and also for images without pixels.
pub fn compute_scale(width: u32, height: u32, bounds: Bounds) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let (w, h) = (u64::from(width), u64::from(height));

    let (scaled_width, scaled_height) = match (bounds.width, bounds.height) {
        (Some(aw), Some(ah)) => {
            let (aw, ah) = (u64::from(aw), u64::from(ah));
            (aw.min(ah * w / h), ah.min(aw * h / w))
        }
        (Some(aw), None) => {
            let aw = u64::from(aw);
            (aw, aw * h / w)
        }
        (None, Some(ah)) => {
            let ah = u64::from(ah);
            (ah * w / h, ah)
        }
        (None, None) => return None,
    };

    if scaled_width > 0 && scaled_height > 0 && scaled_width < w && scaled_height < h {
        // both are strictly smaller than a `u32`
        Some((scaled_width as u32, scaled_height as u32))
    } else {
        None
    }
}
