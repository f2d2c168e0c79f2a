//! The caching layer of the texture cache.
//!
//! Textures are cached in a [`CacheStore`], keyed by a namespaced [`CacheKey`]. Each kind of
//! load (by URI, by raw pixels, as a thumbnail, ...) has its own namespace, so that two
//! requests share an entry exactly if they would produce the same texture.
//!
//! Whether a loaded texture is kept is decided by its [`CachePolicy`]. Kept textures stay in
//! the store until they are removed explicitly or the store is torn down; there is no
//! eviction.
//!
//! # Asynchronous loads
//!
//! The [`LoadCoordinator`] makes sure that concurrent requests for the same key share a single
//! decode. Decoding happens on a separate runtime, but textures are only ever created on the
//! coordinating thread, which is also the only thread touching the store.
//!
//! # Errors
//!
//! Loads fail with a [`CacheError`]. Synchronous loads return it to their caller. Waiters of
//! a failed asynchronous load are only told that no texture is available, and the error is
//! logged once.

mod cache_error;
mod cache_key;
mod coordinator;
mod store;


pub use cache_error::{CacheEntry, CacheError};
pub use cache_key::{CacheKey, CacheKeyBuilder, KeyNamespace, checksum};
pub use coordinator::{LoadCoordinator, LoadRequest, LoadSource, Loaders, Sink};
pub use store::{CacheStore, CachedResource, MetaDestroy, MetaEntry, MetaIdent, StoreEntry};

/// Whether a loaded resource is kept in the [`CacheStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// The resource is handed to the caller but not kept.
    #[default]
    None,
    /// The resource is kept until it is removed explicitly.
    Forever,
}

impl AsRef<str> for CachePolicy {
    fn as_ref(&self) -> &str {
        match self {
            CachePolicy::None => "none",
            CachePolicy::Forever => "forever",
        }
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}
