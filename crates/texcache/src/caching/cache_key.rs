use std::fmt::{self, Write};
use std::sync::Arc;

use sha1::{Digest, Sha1};

/// The namespace a [`CacheKey`] lives in.
///
/// Every kind of load gets its own namespace, so that the same URI loaded in different ways
/// (for example as a texture and as a drawing surface) never shares an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyNamespace {
    /// A texture loaded from a URI.
    Uri,
    /// A drawing surface loaded from a URI.
    UriForSurface,
    /// A texture created from raw pixel data.
    RawChecksum,
    /// A texture decoded from an encoded image in memory.
    CompressedChecksum,
    /// A thumbnail of a URI.
    ThumbnailUri,
    /// A named icon from the icon theme.
    Icon,
    /// Manually inserted textures and the legacy cache file.
    Compat,
    /// An image cut into slices. Only used to coalesce loads, never cached.
    Sliced,
    /// Keys handed in by callers of custom loaders.
    Custom,
}

impl KeyNamespace {
    /// The prefix that is prepended to every key in this namespace.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Uri => "uri:",
            Self::UriForSurface => "uri-for-cairo:",
            Self::RawChecksum => "raw-checksum:",
            Self::CompressedChecksum => "compressed-checksum:",
            Self::ThumbnailUri => "thumbnail-uri:",
            Self::Icon => "gicon:",
            Self::Compat => "compat:",
            Self::Sliced => "sliced:",
            Self::Custom => "custom:",
        }
    }
}

impl AsRef<str> for KeyNamespace {
    fn as_ref(&self) -> &str {
        self.prefix()
    }
}

/// The key of an entry in the [`CacheStore`](super::CacheStore).
///
/// A key is a namespace prefix followed by a request specific identifier, and is cheap to
/// clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl CacheKey {
    /// Key of a texture loaded from `uri`.
    pub fn uri(uri: &str) -> Self {
        Self::builder(KeyNamespace::Uri).with(uri)
    }

    /// Key of a drawing surface loaded from `uri`.
    pub fn uri_for_surface(uri: &str) -> Self {
        Self::builder(KeyNamespace::UriForSurface).with(uri)
    }

    /// Key of a texture made from raw pixels, identified by their checksum.
    pub fn raw_checksum(data: &[u8]) -> Self {
        let mut builder = Self::builder(KeyNamespace::RawChecksum);
        write!(builder, "checksum={}", checksum(data)).unwrap();
        builder.build()
    }

    /// Key of an encoded image decoded to fit into a `size`x`size` square.
    pub fn compressed_checksum(data: &[u8], size: u32) -> Self {
        let mut builder = Self::builder(KeyNamespace::CompressedChecksum);
        write!(builder, "checksum={},size={size}", checksum(data)).unwrap();
        builder.build()
    }

    /// Key of the `size` thumbnail of `uri`.
    pub fn thumbnail(uri: &str, size: u32) -> Self {
        let mut builder = Self::builder(KeyNamespace::ThumbnailUri);
        write!(builder, "uri={uri},size={size}").unwrap();
        builder.build()
    }

    /// Key of the icon `name` rendered at `size`.
    pub fn icon(name: &str, size: u32) -> Self {
        let mut builder = Self::builder(KeyNamespace::Icon);
        write!(builder, "name={name},size={size}").unwrap();
        builder.build()
    }

    /// Key of a manually inserted or legacy `uri`.
    pub fn compat(uri: &str) -> Self {
        Self::builder(KeyNamespace::Compat).with(uri)
    }

    /// Key of the `grid_width`x`grid_height` slices of `uri`.
    pub fn sliced(uri: &str, grid_width: u32, grid_height: u32) -> Self {
        let mut builder = Self::builder(KeyNamespace::Sliced);
        write!(builder, "uri={uri},grid={grid_width}x{grid_height}").unwrap();
        builder.build()
    }

    /// Key of a custom loader, identified by a key chosen by the caller.
    ///
    /// Custom keys live in their own namespace, so they never alias built-in ones.
    pub fn custom(key: &str) -> Self {
        Self::builder(KeyNamespace::Custom).with(key)
    }

    /// Creates a [`CacheKeyBuilder`] for keys in the given namespace.
    pub fn builder(namespace: KeyNamespace) -> CacheKeyBuilder {
        CacheKeyBuilder {
            key: namespace.prefix().to_owned(),
        }
    }

    /// The full key, including its namespace prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A builder for [`CacheKey`]s.
///
/// The builder implements [`Write`](std::fmt::Write); everything written to it is appended to
/// the namespace prefix verbatim, so the written input must be **stable** for equal resources.
pub struct CacheKeyBuilder {
    key: String,
}

impl CacheKeyBuilder {
    fn with(mut self, s: &str) -> CacheKey {
        self.key.push_str(s);
        self.build()
    }

    /// Finalize the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        CacheKey(self.key.into())
    }
}

impl fmt::Write for CacheKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.key.write_str(s)
    }
}

/// Lowercase hex SHA-1 of `data`.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}
