//! Texture handles and the rendering backend they come from.
//!
//! A [`Texture`] is an opaque, reference counted handle to a GPU resource. The cache never
//! looks inside of it; all creation and mutation goes through a [`Renderer`]. Cloning a
//! [`Texture`] takes a new reference, dropping it releases one, and the resource is freed
//! together with the last reference.
//!
//! [`SoftwareRenderer`] keeps pixels in main memory and is used whenever there is no GPU
//! context, most notably in tests and in the command line tool.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::caching::{CacheEntry, CacheError};

mod convert;
mod surface;

pub use convert::*;
pub use surface::*;

/// The layout of pixel data handed to a [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel, red green blue.
    Rgb888,
    /// 4 bytes per pixel, red green blue alpha, not premultiplied.
    Rgba8888,
}

impl PixelFormat {
    /// The format of a decoded buffer with or without an alpha channel.
    pub fn for_alpha(has_alpha: bool) -> Self {
        if has_alpha {
            Self::Rgba8888
        } else {
            Self::Rgb888
        }
    }

    /// Number of bytes of a single pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb888 => 3,
            Self::Rgba8888 => 4,
        }
    }
}

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

struct TextureInner {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    storage: Box<dyn Any + Send + Sync>,
}

/// A reference counted handle to a texture owned by a [`Renderer`].
#[derive(Clone)]
pub struct Texture(Arc<TextureInner>);

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.0.id)
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .field("format", &self.0.format)
            .finish_non_exhaustive()
    }
}

// Equality is identity of the underlying resource.
impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.same_resource(other)
    }
}

impl Texture {
    /// Wraps backend specific `storage` into a new texture handle.
    ///
    /// This is meant to be called by [`Renderer`] implementations only.
    pub fn new<S: Any + Send + Sync>(
        width: u32,
        height: u32,
        format: PixelFormat,
        storage: S,
    ) -> Self {
        Self(Arc::new(TextureInner {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format,
            storage: Box::new(storage),
        }))
    }

    /// A process wide unique id of the underlying resource.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn width(&self) -> u32 {
        self.0.width
    }

    pub fn height(&self) -> u32 {
        self.0.height
    }

    pub fn format(&self) -> PixelFormat {
        self.0.format
    }

    /// The backend specific storage, if it is of type `S`.
    pub fn storage<S: Any>(&self) -> Option<&S> {
        self.0.storage.downcast_ref()
    }

    /// The number of live handles to the underlying resource.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether both handles refer to the same underlying resource.
    pub fn same_resource(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The rendering backend textures are created with.
///
/// Implementations must only be called from the thread that owns the rendering context. The
/// cache guarantees this by creating textures exclusively on its coordinating thread.
pub trait Renderer: Send + Sync {
    /// Creates a texture of the given size from pixel `data` laid out as `format`.
    fn texture_from_data(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        rowstride: usize,
        data: &[u8],
    ) -> CacheEntry<Texture>;

    /// Creates a texture with undefined contents.
    fn texture_with_size(&self, width: u32, height: u32, format: PixelFormat)
    -> CacheEntry<Texture>;

    /// Sets every pixel of `texture` to fully transparent.
    fn clear(&self, texture: &Texture) -> CacheEntry;

    /// Overwrites the region at `x`/`y` with pixel `data`.
    #[allow(clippy::too_many_arguments)]
    fn set_region(
        &self,
        texture: &Texture,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
        rowstride: usize,
        data: &[u8],
    ) -> CacheEntry;

    /// Creates a texture showing the given rectangle of `texture`.
    fn sub_texture(
        &self,
        texture: &Texture,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> CacheEntry<Texture>;
}

/// Pixels of a texture created by the [`SoftwareRenderer`], stored as tightly packed RGBA.
struct SoftwarePixels(Mutex<Vec<u8>>);

/// A [`Renderer`] that keeps textures in main memory.
#[derive(Debug, Default)]
pub struct SoftwareRenderer;

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Reads back the pixels of `texture` as tightly packed RGBA.
    pub fn read_pixels(&self, texture: &Texture) -> CacheEntry<Vec<u8>> {
        let pixels = Self::pixels(texture)?;
        let data = pixels.0.lock().unwrap().clone();
        Ok(data)
    }

    fn pixels(texture: &Texture) -> CacheEntry<&SoftwarePixels> {
        texture.storage::<SoftwarePixels>().ok_or_else(|| {
            tracing::error!(texture = texture.id(), "texture from a foreign renderer");
            CacheError::InternalError
        })
    }
}

/// Copies `width`x`height` pixels of `format` from `src` into the packed RGBA `dst`.
#[allow(clippy::too_many_arguments)]
fn blit(
    dst: &mut [u8],
    dst_width: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    format: PixelFormat,
    rowstride: usize,
    src: &[u8],
) -> CacheEntry {
    let bpp = format.bytes_per_pixel();
    let row_len = width as usize * bpp;
    if height > 0 && src.len() < rowstride * (height as usize - 1) + row_len {
        tracing::error!(len = src.len(), width, height, rowstride, "pixel data too short");
        return Err(CacheError::InternalError);
    }

    for row in 0..height as usize {
        let src_row = &src[row * rowstride..row * rowstride + row_len];
        let dst_start = ((y as usize + row) * dst_width as usize + x as usize) * 4;
        let dst_row = &mut dst[dst_start..dst_start + width as usize * 4];
        match format {
            PixelFormat::Rgba8888 => dst_row.copy_from_slice(src_row),
            PixelFormat::Rgb888 => {
                for (d, s) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(3)) {
                    d[..3].copy_from_slice(s);
                    d[3] = 0xff;
                }
            }
        }
    }
    Ok(())
}

impl Renderer for SoftwareRenderer {
    fn texture_from_data(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        rowstride: usize,
        data: &[u8],
    ) -> CacheEntry<Texture> {
        let mut pixels = vec![0; width as usize * height as usize * 4];
        blit(&mut pixels, width, 0, 0, width, height, format, rowstride, data)?;
        Ok(Texture::new(
            width,
            height,
            format,
            SoftwarePixels(Mutex::new(pixels)),
        ))
    }

    fn texture_with_size(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> CacheEntry<Texture> {
        let pixels = vec![0; width as usize * height as usize * 4];
        Ok(Texture::new(
            width,
            height,
            format,
            SoftwarePixels(Mutex::new(pixels)),
        ))
    }

    fn clear(&self, texture: &Texture) -> CacheEntry {
        Self::pixels(texture)?.0.lock().unwrap().fill(0);
        Ok(())
    }

    fn set_region(
        &self,
        texture: &Texture,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
        rowstride: usize,
        data: &[u8],
    ) -> CacheEntry {
        if x + width > texture.width() || y + height > texture.height() {
            tracing::error!(x, y, width, height, "region outside of texture");
            return Err(CacheError::InternalError);
        }
        let mut pixels = Self::pixels(texture)?.0.lock().unwrap();
        blit(
            &mut pixels,
            texture.width(),
            x,
            y,
            width,
            height,
            format,
            rowstride,
            data,
        )
    }

    fn sub_texture(
        &self,
        texture: &Texture,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> CacheEntry<Texture> {
        if x + width > texture.width() || y + height > texture.height() {
            tracing::error!(x, y, width, height, "sub texture outside of texture");
            return Err(CacheError::InternalError);
        }
        let pixels = Self::pixels(texture)?.0.lock().unwrap();
        let rowstride = texture.width() as usize * 4;
        let offset = y as usize * rowstride + x as usize * 4;
        self.texture_from_data(
            width,
            height,
            PixelFormat::Rgba8888,
            rowstride,
            &pixels[offset..],
        )
    }
}
