use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::caching::{CacheEntry, CacheError};

use super::{Bounds, Decoder, PixelBuffer, decode_data_uri, decode_image, is_data_uri};

static URI_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^([a-zA-Z0-9+.-]+)://").unwrap());

/// Turns a URI or a filesystem path into a URI.
///
/// Anything that does not start with `scheme://` (or `data:`) is treated as a path. Relative
/// paths are resolved against the current directory.
pub fn normalize_uri(uri_or_path: &str) -> CacheEntry<String> {
    if URI_SCHEME.is_match(uri_or_path) || is_data_uri(uri_or_path) {
        return Ok(uri_or_path.to_owned());
    }
    file_uri(Path::new(uri_or_path))
}

/// The `file://` URI of `path`.
pub fn file_uri(path: &Path) -> CacheEntry<String> {
    let absolute = if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| CacheError::Unsupported(format!("path {}", absolute.display())))
}

/// The local path behind a `file://` URI.
pub fn uri_to_path(uri: &str) -> CacheEntry<PathBuf> {
    let url = Url::parse(uri).map_err(|e| CacheError::Malformed(format!("uri: {e}")))?;
    if url.scheme() != "file" {
        return Err(CacheError::Unsupported(format!("uri scheme `{}`", url.scheme())));
    }
    url.to_file_path()
        .map_err(|()| CacheError::Unsupported(format!("uri `{uri}` without local path")))
}

/// Reads the raw bytes behind `uri`, which is either a `data:` or a `file://` URI.
pub fn read_uri(uri: &str) -> CacheEntry<Vec<u8>> {
    if is_data_uri(uri) {
        return decode_data_uri(uri);
    }
    let path = uri_to_path(uri)?;
    Ok(fs::read(path)?)
}

/// Reads and decodes the image behind `uri` to fit `bounds`.
pub fn load_uri(decoder: &dyn Decoder, uri: &str, bounds: Bounds) -> CacheEntry<PixelBuffer> {
    let data = read_uri(uri)?;
    decode_image(decoder, &data, bounds)
}
