use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use crate::texture::{Surface, Texture};

use super::CacheKey;

/// The resource a cache entry holds on to.
#[derive(Debug, Clone)]
pub enum CachedResource {
    Texture(Texture),
    Surface(Surface),
}

impl CachedResource {
    pub fn texture(&self) -> Option<&Texture> {
        match self {
            Self::Texture(texture) => Some(texture),
            Self::Surface(_) => None,
        }
    }

    pub fn surface(&self) -> Option<&Surface> {
        match self {
            Self::Surface(surface) => Some(surface),
            Self::Texture(_) => None,
        }
    }
}

/// Identifies a [`MetaEntry`] within the entry of its base image.
///
/// The identifier is opaque to the cache; callers usually derive it from whatever they
/// composited the variant from.
pub type MetaIdent = Arc<str>;

/// Called with the identifier of a [`MetaEntry`] when it is released.
pub type MetaDestroy = Box<dyn FnOnce(&MetaIdent) + Send>;

/// A secondary texture cached under the same key as its base image.
pub struct MetaEntry {
    ident: MetaIdent,
    texture: Texture,
    destroy: Option<MetaDestroy>,
}

impl MetaEntry {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }
}

impl fmt::Debug for MetaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaEntry")
            .field("ident", &self.ident)
            .field("texture", &self.texture)
            .field("destroy", &self.destroy.is_some())
            .finish()
    }
}

impl Drop for MetaEntry {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy.take() {
            destroy(&self.ident);
        }
    }
}

/// An entry of the [`CacheStore`].
///
/// An entry created through [`CacheStore::insert_meta`] has no resource of its own until one
/// is inserted for its key.
#[derive(Debug, Default)]
pub struct StoreEntry {
    resource: Option<CachedResource>,
    meta: Option<HashMap<MetaIdent, MetaEntry>>,
}

impl StoreEntry {
    pub fn new(resource: CachedResource) -> Self {
        Self {
            resource: Some(resource),
            meta: None,
        }
    }

    pub fn resource(&self) -> Option<&CachedResource> {
        self.resource.as_ref()
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.resource.as_ref()?.texture()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.resource.as_ref()?.surface()
    }

    pub fn meta(&self, ident: &str) -> Option<&MetaEntry> {
        self.meta.as_ref()?.get(ident)
    }
}

/// The mapping of keys to cached resources.
///
/// The store is unbounded and never evicts anything on its own. Dropping an entry releases
/// the references it holds and runs the destroy callbacks of its meta entries.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<CacheKey, StoreEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<&StoreEntry> {
        self.entries.get(key)
    }

    /// A new reference to the texture cached for `key`.
    pub fn texture(&self, key: &CacheKey) -> Option<Texture> {
        self.lookup(key)?.texture().cloned()
    }

    /// A new reference to the surface cached for `key`.
    pub fn surface(&self, key: &CacheKey) -> Option<Surface> {
        self.lookup(key)?.surface().cloned()
    }

    /// A new reference to the meta texture `ident` of `key`.
    pub fn meta_texture(&self, key: &CacheKey, ident: &str) -> Option<Texture> {
        Some(self.lookup(key)?.meta(ident)?.texture.clone())
    }

    /// Inserts `resource` for `key`, releasing the resource it replaces.
    ///
    /// Meta entries of `key` survive the replacement.
    pub fn insert(&mut self, key: CacheKey, resource: CachedResource) {
        let replaced = match self.entries.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().resource.replace(resource),
            Entry::Vacant(entry) => {
                entry.insert(StoreEntry::new(resource));
                None
            }
        };
        drop(replaced);
        crate::metric!(gauge("texcache.entries") = self.entries.len() as u64);
    }

    /// Inserts `resource` for `key` unless there already is one.
    ///
    /// Returns whether `resource` was inserted.
    pub fn insert_if_absent(&mut self, key: CacheKey, resource: CachedResource) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.insert(key, resource);
        true
    }

    /// Inserts a meta texture `ident` for `key`, creating the entry of `key` if needed.
    ///
    /// A meta entry already registered under `ident` is replaced and its `destroy` callback
    /// runs.
    pub fn insert_meta(
        &mut self,
        key: CacheKey,
        ident: MetaIdent,
        texture: &Texture,
        destroy: Option<MetaDestroy>,
    ) {
        let entry = self.entries.entry(key).or_default();
        let meta = entry.meta.get_or_insert_with(HashMap::new);
        let replaced = meta.insert(
            ident.clone(),
            MetaEntry {
                ident,
                texture: texture.clone(),
                destroy,
            },
        );
        drop(replaced);
        crate::metric!(gauge("texcache.entries") = self.entries.len() as u64);
    }

    /// Whether a resource is cached for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lookup(key).is_some_and(|entry| entry.resource.is_some())
    }

    pub fn contains_meta(&self, key: &CacheKey, ident: &str) -> bool {
        self.lookup(key)
            .is_some_and(|entry| entry.meta(ident).is_some())
    }

    /// Removes and releases the entry of `key`.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// The number of entries in the store.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Releases every entry.
    pub fn teardown(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        tracing::debug!(count, "released all cache entries");
        crate::metric!(gauge("texcache.entries") = 0u64);
    }
}
