//! Helpers for testing the texture cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory is held for the
//!    entire lifetime of the test, otherwise fixtures written to it disappear early.
//!
//!  - Asynchronous loads decode on the runtime returned by [`decode_pool`]. Keep it alive
//!    until all loads have been delivered.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::prelude::*;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

use texcache::TextureCache;
use texcache::caching::CacheEntry;
use texcache::config::{Config, Thumbnails};
use texcache::pixbuf::{Bounds, DecodedImage, Decoder, ImageDecoder};
use texcache::texture::SoftwareRenderer;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `texcache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("texcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A multi-threaded runtime to decode images on.
pub fn decode_pool() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("texcache-test-decode")
        .build()
        .unwrap()
}

/// A configuration without any external state, storing thumbnails in `thumbnail_dir`.
pub fn config(thumbnail_dir: Option<&Path>) -> Config {
    Config {
        thumbnails: Thumbnails {
            cache_dir: thumbnail_dir.map(Path::to_owned),
            size: 64,
            max_source_size: None,
        },
        ..Config::default()
    }
}

/// A cache backed by a [`SoftwareRenderer`] that decodes through `decoder`.
pub fn texture_cache(
    runtime: &tokio::runtime::Runtime,
    config: &Config,
    decoder: Arc<dyn Decoder>,
) -> TextureCache {
    TextureCache::new(config, Arc::new(SoftwareRenderer::new()), runtime.handle().clone())
        .with_decoder(decoder)
}

/// A `width`x`height` RGBA image with a distinct color per pixel.
pub fn image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8, 255])
    })
}

/// The PNG encoding of [`image`].
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image(width, height))
        .write_to(&mut encoded, ImageFormat::Png)
        .unwrap();
    encoded.into_inner()
}

/// A `width`x`height` JPEG carrying the EXIF `orientation` tag.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut encoded, ImageFormat::Jpeg)
        .unwrap();
    let jpeg = encoded.into_inner();

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II\x2a\x00\x08\x00\x00\x00");
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&orientation.to_le_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    let segment_len = (2 + 6 + tiff.len()) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + segment_len as usize + 2);
    // the APP1 segment goes right after the SOI marker
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xff, 0xe1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// A base64 `data:` URI of `data`.
pub fn data_uri(mime_type: &str, data: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64_STANDARD.encode(data))
}

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_fixture(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// A [`Decoder`] counting how often it is invoked.
#[derive(Debug, Default)]
pub struct CountingDecoder {
    calls: AtomicUsize,
}

impl CountingDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The number of decoder passes so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for CountingDecoder {
    fn decode_scaled(&self, data: &[u8], bounds: Bounds) -> CacheEntry<DecodedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ImageDecoder.decode_scaled(data, bounds)
    }
}
