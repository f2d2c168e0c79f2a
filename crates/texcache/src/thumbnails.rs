//! Thumbnails of arbitrary files.
//!
//! Thumbnails are produced by a [`ThumbnailFactory`], which also remembers sources it failed
//! to thumbnail. Such a failure is recorded together with the modification time of the
//! source, and requests for the same revision of the source fail right away instead of
//! attempting the generation again.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use image::ImageFormat;
use image::imageops::FilterType;
use sha2::{Digest, Sha256};

use crate::caching::{CacheEntry, CacheError};
use crate::config::Thumbnails;
use crate::pixbuf::{
    Bounds, Decoder, PixelBuffer, compute_scale, decode_image, read_uri, uri_to_path,
};

/// Creates, stores and looks up thumbnails.
///
/// `mtime` is the modification time of the source in seconds since the unix epoch.
pub trait ThumbnailFactory: Send + Sync {
    /// The path of a stored thumbnail of `uri` that is up to date with `mtime`.
    fn lookup(&self, uri: &str, mtime: u64) -> Option<PathBuf>;

    /// Whether generating a thumbnail for this revision of `uri` failed before.
    fn has_valid_failed_thumbnail(&self, uri: &str, mtime: u64) -> bool;

    /// Whether this factory is able to thumbnail `uri`.
    fn can_thumbnail(&self, uri: &str, mime_type: &str, mtime: u64) -> bool;

    fn generate_thumbnail(&self, uri: &str, mime_type: &str) -> CacheEntry<PixelBuffer>;

    fn save_thumbnail(&self, thumbnail: &PixelBuffer, uri: &str, mtime: u64) -> CacheEntry;

    /// Records that thumbnailing this revision of `uri` failed.
    fn create_failed_thumbnail(&self, uri: &str, mtime: u64) -> CacheEntry;
}

/// The modification time of the local file behind `uri`.
pub fn source_mtime(uri: &str) -> CacheEntry<u64> {
    let modified = fs::metadata(uri_to_path(uri)?)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|age| age.as_secs())
        .unwrap_or_default())
}

/// Loads the thumbnail of `uri`, generating and storing it if necessary.
///
/// The resulting image fits into a `size`x`size` square.
pub fn load_thumbnail(
    factory: &dyn ThumbnailFactory,
    decoder: &dyn Decoder,
    uri: &str,
    mime_type: &str,
    size: u32,
) -> CacheEntry<PixelBuffer> {
    let mtime = source_mtime(uri)
        .map_err(|e| CacheError::ThumbnailFailed(format!("no modification time: {e}")))?;

    if let Some(path) = factory.lookup(uri, mtime) {
        let data = fs::read(path)?;
        return decode_image(decoder, &data, Bounds::square(size));
    }

    if factory.has_valid_failed_thumbnail(uri, mtime) {
        crate::metric!(counter("texcache.thumbnail.negative_hit") += 1);
        return Err(CacheError::ThumbnailFailed("has failed thumbnail".into()));
    }

    if !factory.can_thumbnail(uri, mime_type, mtime) {
        return Err(CacheError::ThumbnailFailed(format!(
            "cannot thumbnail {mime_type}"
        )));
    }

    match factory.generate_thumbnail(uri, mime_type) {
        Ok(thumbnail) => {
            if let Err(error) = factory.save_thumbnail(&thumbnail, uri, mtime) {
                tracing::warn!(%uri, %error, "failed to save thumbnail");
            }
            Ok(shrink_to(thumbnail, size))
        }
        Err(error) => {
            tracing::debug!(%uri, %error, "thumbnail generation failed");
            if let Err(error) = factory.create_failed_thumbnail(uri, mtime) {
                tracing::warn!(%uri, %error, "failed to record failed thumbnail");
            }
            Err(CacheError::ThumbnailFailed(
                "failed to generate thumbnail".into(),
            ))
        }
    }
}

fn shrink_to(buffer: PixelBuffer, size: u32) -> PixelBuffer {
    match compute_scale(buffer.width(), buffer.height(), Bounds::square(size)) {
        Some((width, height)) => PixelBuffer::from_image(buffer.to_image().resize_exact(
            width,
            height,
            FilterType::Triangle,
        )),
        None => buffer,
    }
}

/// A [`ThumbnailFactory`] for images, storing thumbnails as PNG files in a local directory.
///
/// Thumbnails live in `<dir>/large/<sha256 of the uri>.png` and are up to date if they were
/// written after the source was last modified. Failures are recorded in
/// `<dir>/fail/<sha256 of the uri>`, containing the modification time of the source.
pub struct LocalThumbnailFactory {
    dir: PathBuf,
    size: u32,
    max_source_size: Option<u64>,
    decoder: Arc<dyn Decoder>,
}

impl LocalThumbnailFactory {
    pub fn new(config: &Thumbnails, dir: &Path, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            dir: dir.to_owned(),
            size: config.size,
            max_source_size: config.max_source_size,
            decoder,
        }
    }

    fn hashed_name(uri: &str) -> String {
        hex::encode(Sha256::digest(uri))
    }

    fn thumbnail_path(&self, uri: &str) -> PathBuf {
        let mut path = self.dir.join("large").join(Self::hashed_name(uri));
        path.set_extension("png");
        path
    }

    fn failed_path(&self, uri: &str) -> PathBuf {
        self.dir.join("fail").join(Self::hashed_name(uri))
    }
}

fn write_file(path: &Path, contents: &[u8]) -> CacheEntry {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

impl ThumbnailFactory for LocalThumbnailFactory {
    fn lookup(&self, uri: &str, mtime: u64) -> Option<PathBuf> {
        let path = self.thumbnail_path(uri);
        let written = fs::metadata(&path).ok()?.modified().ok()?;
        let written = written.duration_since(UNIX_EPOCH).ok()?.as_secs();
        (written >= mtime).then_some(path)
    }

    fn has_valid_failed_thumbnail(&self, uri: &str, mtime: u64) -> bool {
        fs::read_to_string(self.failed_path(uri))
            .ok()
            .and_then(|contents| contents.trim().parse::<u64>().ok())
            == Some(mtime)
    }

    fn can_thumbnail(&self, uri: &str, mime_type: &str, mtime: u64) -> bool {
        if !mime_type.starts_with("image/") || self.has_valid_failed_thumbnail(uri, mtime) {
            return false;
        }
        match (self.max_source_size, uri_to_path(uri)) {
            (None, Ok(_)) => true,
            (Some(max), Ok(path)) => fs::metadata(path).is_ok_and(|meta| meta.len() <= max),
            (_, Err(_)) => false,
        }
    }

    fn generate_thumbnail(&self, uri: &str, _mime_type: &str) -> CacheEntry<PixelBuffer> {
        let data = read_uri(uri)?;
        decode_image(self.decoder.as_ref(), &data, Bounds::square(self.size))
    }

    fn save_thumbnail(&self, thumbnail: &PixelBuffer, uri: &str, _mtime: u64) -> CacheEntry {
        let mut encoded = Cursor::new(Vec::new());
        thumbnail.to_image().write_to(&mut encoded, ImageFormat::Png)?;
        write_file(&self.thumbnail_path(uri), encoded.get_ref())
    }

    fn create_failed_thumbnail(&self, uri: &str, mtime: u64) -> CacheEntry {
        write_file(&self.failed_path(uri), mtime.to_string().as_bytes())
    }
}
