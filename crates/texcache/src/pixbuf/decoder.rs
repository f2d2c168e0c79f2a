use std::io::Cursor;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder as _, ImageReader};

use crate::caching::CacheEntry;

use super::{Bounds, PixelBuffer, compute_scale};

/// The result of a single decoder pass.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// The pixels as they are stored in the file, already shrunk to fit the bounds.
    pub buffer: PixelBuffer,
    /// The orientation that still needs to be applied to `buffer`.
    pub orientation: Orientation,
}

/// Turns encoded image bytes into pixels.
///
/// Decoders are shared with the decode workers and must not rely on thread local state.
pub trait Decoder: Send + Sync {
    /// Decodes `data`, shrinking the image to fit `bounds` if it is larger.
    ///
    /// The natural size of the image is to be passed through [`compute_scale`] as soon as it
    /// is known. Orientation metadata is reported, but not applied.
    fn decode_scaled(&self, data: &[u8], bounds: Bounds) -> CacheEntry<DecodedImage>;
}

/// The default [`Decoder`], backed by the [`image`] crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn decode_scaled(&self, data: &[u8], bounds: Bounds) -> CacheEntry<DecodedImage> {
        let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        let mut decoder = reader.into_decoder()?;

        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let (width, height) = decoder.dimensions();
        let scale = compute_scale(width, height, bounds);

        let mut image = DynamicImage::from_decoder(decoder)?;
        if let Some((scaled_width, scaled_height)) = scale {
            image = image.resize_exact(scaled_width, scaled_height, FilterType::Triangle);
        }

        Ok(DecodedImage {
            buffer: PixelBuffer::from_image(image),
            orientation,
        })
    }
}

/// Applies `orientation` to the pixels of `buffer`.
pub fn apply_orientation(buffer: PixelBuffer, orientation: Orientation) -> PixelBuffer {
    if orientation == Orientation::NoTransforms {
        return buffer;
    }
    let mut image = buffer.to_image();
    image.apply_orientation(orientation);
    PixelBuffer::from_image(image)
}

/// Decodes `data` to fit `bounds` and applies its orientation.
///
/// The bounds are applied to the image as it is stored. When applying the orientation swaps
/// width and height, the image is decoded a second time with swapped bounds so that the
/// oriented result fits the bounds as requested.
pub fn decode_image(decoder: &dyn Decoder, data: &[u8], bounds: Bounds) -> CacheEntry<PixelBuffer> {
    let decoded = decoder.decode_scaled(data, bounds)?;
    crate::metric!(counter("texcache.decode") += 1, "pass" => "first");

    let width_before = decoded.buffer.width();
    let oriented = apply_orientation(decoded.buffer, decoded.orientation);
    if oriented.width() == width_before || bounds.width == bounds.height {
        return Ok(oriented);
    }

    tracing::trace!(?bounds, "redecoding rotated image with swapped bounds");
    let decoded = decoder.decode_scaled(data, bounds.swapped())?;
    crate::metric!(counter("texcache.decode") += 1, "pass" => "rotated");
    Ok(apply_orientation(decoded.buffer, decoded.orientation))
}
