use std::io;

use thiserror::Error;

/// An error that happens while loading an image into a texture.
///
/// The error is [`Clone`] so that a single failure can be handed to every consumer that was
/// waiting on the same load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The file or resource behind the URI does not exist.
    #[error("not found")]
    NotFound,
    /// The resource exists but could not be read.
    ///
    /// The attached string contains the underlying I/O error.
    #[error("i/o error: {0}")]
    Io(String),
    /// The resource was read successfully, but its contents could not be decoded as an image.
    #[error("malformed: {0}")]
    Malformed(String),
    /// The resource is of a kind that cannot be loaded at all.
    ///
    /// This covers `data:` URIs with an unknown media type, URI schemes that are not backed
    /// by a local file, and image formats the decoder does not support.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Generating a thumbnail failed, or a previous attempt for the same source revision was
    /// recorded as failed.
    #[error("thumbnail failed: {0}")]
    ThumbnailFailed(String),
    /// An unexpected error in the texture cache or the rendering backend.
    #[error("internal error")]
    InternalError,
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;

        match err {
            ImageError::IoError(e) => e.into(),
            ImageError::Unsupported(e) => Self::Unsupported(e.to_string()),
            ImageError::Decoding(e) => Self::Malformed(e.to_string()),
            ImageError::Limits(e) => Self::Malformed(e.to_string()),
            ImageError::Parameter(e) => Self::Malformed(e.to_string()),
            e @ ImageError::Encoding(_) => Self::from_std_error(e),
        }
    }
}

impl CacheError {
    /// Logs the given error and turns it into an [`InternalError`](Self::InternalError).
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }

    /// A short name of the error kind, used to tag metrics.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Io(_) => "io",
            Self::Malformed(_) => "malformed",
            Self::Unsupported(_) => "unsupported",
            Self::ThumbnailFailed(_) => "thumbnail",
            Self::InternalError => "internal",
        }
    }
}

/// Either the loaded `T` or the reason why it could not be loaded.
pub type CacheEntry<T = ()> = Result<T, CacheError>;
