//! The public texture cache.
//!
//! A [`TextureCache`] is created once by the application and passed to everything that needs
//! textures. It ties the [`CacheStore`] and the [`LoadCoordinator`] to a [`Renderer`] and the
//! loaders configured for it.
//!
//! Synchronous loads block the calling thread and return a
//! [`CacheError`](crate::caching::CacheError) on failure. Asynchronous loads hand out a
//! [`Renderable`] right away, which shows its texture once the coordinating thread calls
//! [`TextureCache::dispatch_completions`] after decoding finished.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::bind::{self, PixbufSource};
use crate::caching::{
    CacheEntry, CacheKey, CachePolicy, CacheStore, CachedResource, LoadCoordinator, LoadRequest,
    LoadSource, Loaders, MetaDestroy, Sink,
};
use crate::config::Config;
use crate::icons::IconTheme;
use crate::legacy::{self, RecordRegion};
use crate::pixbuf::{
    Bounds, Decoder, ImageDecoder, PixelBuffer, decode_image, file_uri, load_uri, normalize_uri,
};
use crate::renderable::{Renderable, SlicedImage};
use crate::texture::{Renderer, Surface, Texture, surface_from_pixbuf, texture_from_pixbuf};
use crate::thumbnails::{LocalThumbnailFactory, ThumbnailFactory};

/// Caches textures loaded from files, URIs, encoded and raw image data.
pub struct TextureCache {
    store: Mutex<CacheStore>,
    coordinator: LoadCoordinator,
    renderer: Arc<dyn Renderer>,
    cpu_pool: Handle,
}

impl fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureCache")
            .field("size", &self.size())
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl TextureCache {
    /// Creates a cache creating its textures with `renderer` and decoding on `cpu_pool`.
    pub fn new(config: &Config, renderer: Arc<dyn Renderer>, cpu_pool: Handle) -> Self {
        let decoder: Arc<dyn Decoder> = Arc::new(ImageDecoder);
        let thumbnails = config.thumbnails.cache_dir.as_deref().map(|dir| {
            let factory = LocalThumbnailFactory::new(&config.thumbnails, dir, decoder.clone());
            Arc::new(factory) as Arc<dyn ThumbnailFactory>
        });
        let loaders = Loaders {
            decoder,
            thumbnails,
            icons: None,
        };

        Self {
            store: Mutex::new(CacheStore::new()),
            coordinator: LoadCoordinator::new(cpu_pool.clone(), loaders),
            renderer,
            cpu_pool,
        }
    }

    fn with_loaders(mut self, f: impl FnOnce(&mut Loaders)) -> Self {
        let mut loaders = self.coordinator.loaders().clone();
        f(&mut loaders);
        self.coordinator = LoadCoordinator::new(self.cpu_pool.clone(), loaders);
        self
    }

    /// Replaces the decoder used for all loads.
    pub fn with_decoder(self, decoder: Arc<dyn Decoder>) -> Self {
        self.with_loaders(|loaders| loaders.decoder = decoder)
    }

    pub fn with_thumbnail_factory(self, factory: Arc<dyn ThumbnailFactory>) -> Self {
        self.with_loaders(|loaders| loaders.thumbnails = Some(factory))
    }

    pub fn with_icon_theme(self, theme: Arc<dyn IconTheme>) -> Self {
        self.with_loaders(|loaders| loaders.icons = Some(theme))
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    fn decoder(&self) -> &dyn Decoder {
        self.coordinator.loaders().decoder.as_ref()
    }

    /// Looks up the cached texture of `key`, recording the cache access.
    fn cached_texture(&self, key: &CacheKey) -> Option<Texture> {
        crate::metric!(counter("texcache.access") += 1);
        let texture = self.store.lock().unwrap().texture(key)?;
        crate::metric!(counter("texcache.memory.hit") += 1);
        tracing::trace!(%key, "cache hit");
        Some(texture)
    }

    fn store_texture(&self, key: CacheKey, texture: &Texture) {
        self.store
            .lock()
            .unwrap()
            .insert(key, CachedResource::Texture(texture.clone()));
    }

    fn request(&self, key: CacheKey, request: LoadRequest, sink: Sink) {
        self.coordinator.request_async(key, request, sink);
    }

    /// Synchronously loads the image at `uri` into a texture.
    ///
    /// Unless `policy` is [`CachePolicy::None`], a cached texture is returned without loading.
    pub fn load_uri_sync_to_texture(
        &self,
        policy: CachePolicy,
        uri: &str,
        bounds: Bounds,
    ) -> CacheEntry<Texture> {
        let key = CacheKey::uri(uri);
        if policy != CachePolicy::None {
            if let Some(texture) = self.cached_texture(&key) {
                return Ok(texture);
            }
        }

        let pixbuf = load_uri(self.decoder(), uri, bounds)?;
        let texture = texture_from_pixbuf(self.renderer(), &pixbuf, false)?;
        if policy == CachePolicy::Forever {
            self.store_texture(key, &texture);
        }
        Ok(texture)
    }

    /// Synchronously loads the image at `uri` into a new renderable.
    pub fn load_uri_sync(
        &self,
        policy: CachePolicy,
        uri: &str,
        bounds: Bounds,
    ) -> CacheEntry<Renderable> {
        self.load_uri_sync_to_texture(policy, uri, bounds)
            .map(Renderable::from_texture)
    }

    /// Starts loading the image at `uri`.
    ///
    /// The returned renderable is transparent until the texture has been delivered. It stays
    /// transparent if the load fails. The texture is not cached.
    pub fn load_uri_async(&self, uri: &str, bounds: Bounds) -> Renderable {
        let renderable = Renderable::new_empty();
        let request = LoadRequest {
            source: LoadSource::Uri(uri.to_owned()),
            bounds,
            enforce_square: false,
            policy: CachePolicy::None,
        };
        self.request(
            CacheKey::uri(uri),
            request,
            Sink::Renderable(renderable.downgrade()),
        );
        renderable
    }

    /// Starts loading the image at `uri`, receiving the texture through a channel.
    ///
    /// The channel receives `None` if the load fails.
    pub fn request_texture(
        &self,
        policy: CachePolicy,
        uri: &str,
        bounds: Bounds,
    ) -> oneshot::Receiver<Option<Texture>> {
        let (sender, receiver) = oneshot::channel();
        let key = CacheKey::uri(uri);
        if policy != CachePolicy::None {
            if let Some(texture) = self.cached_texture(&key) {
                let _ = sender.send(Some(texture));
                return receiver;
            }
        }

        let request = LoadRequest {
            source: LoadSource::Uri(uri.to_owned()),
            bounds,
            enforce_square: false,
            policy,
        };
        self.request(key, request, Sink::Channel(sender));
        receiver
    }

    /// Synchronously loads the file at `path` into a texture that is cached forever.
    pub fn load_file_to_texture(&self, path: &Path) -> CacheEntry<Texture> {
        let uri = file_uri(path)?;
        self.load_uri_sync_to_texture(CachePolicy::Forever, &uri, Bounds::UNBOUNDED)
    }

    /// Synchronously loads the file at `path` into a drawing surface that is cached forever.
    pub fn load_file_to_surface(&self, path: &Path) -> CacheEntry<Surface> {
        let uri = file_uri(path)?;
        let key = CacheKey::uri_for_surface(&uri);
        if let Some(surface) = self.store.lock().unwrap().surface(&key) {
            return Ok(surface);
        }

        let pixbuf = load_uri(self.decoder(), &uri, Bounds::UNBOUNDED)?;
        let surface = surface_from_pixbuf(&pixbuf);
        self.store
            .lock()
            .unwrap()
            .insert(key, CachedResource::Surface(surface.clone()));
        Ok(surface)
    }

    /// Like [`load_file_to_texture`](Self::load_file_to_texture), but returns an empty
    /// renderable on failure.
    pub fn load_file_simple(&self, path: &Path) -> Renderable {
        match self.load_file_to_texture(path) {
            Ok(texture) => Renderable::from_texture(texture),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to load image");
                Renderable::new_empty()
            }
        }
    }

    fn compat_key(uri_or_path: &str) -> CacheEntry<CacheKey> {
        Ok(CacheKey::compat(&normalize_uri(uri_or_path)?))
    }

    /// A texture of the image at `uri_or_path`, loading and caching it on first use.
    pub fn get_texture(&self, uri_or_path: &str) -> CacheEntry<Texture> {
        let uri = normalize_uri(uri_or_path)?;
        let key = CacheKey::compat(&uri);
        if let Some(texture) = self.cached_texture(&key) {
            return Ok(texture);
        }

        let pixbuf = load_uri(self.decoder(), &uri, Bounds::UNBOUNDED)?;
        let texture = texture_from_pixbuf(self.renderer(), &pixbuf, false)?;
        self.store_texture(key, &texture);
        Ok(texture)
    }

    /// A new renderable showing [`get_texture`](Self::get_texture).
    pub fn get_renderable(&self, uri_or_path: &str) -> CacheEntry<Renderable> {
        self.get_texture(uri_or_path).map(Renderable::from_texture)
    }

    /// The meta texture `ident` registered for `uri_or_path`.
    pub fn get_meta_texture(&self, uri_or_path: &str, ident: &str) -> Option<Texture> {
        let key = Self::compat_key(uri_or_path).ok()?;
        self.store.lock().unwrap().meta_texture(&key, ident)
    }

    pub fn get_meta_renderable(&self, uri_or_path: &str, ident: &str) -> Option<Renderable> {
        self.get_meta_texture(uri_or_path, ident)
            .map(Renderable::from_texture)
    }

    /// Caches `texture` for `uri_or_path`, replacing the texture cached before.
    pub fn insert(&self, uri_or_path: &str, texture: &Texture) -> CacheEntry {
        let key = Self::compat_key(uri_or_path)?;
        self.store_texture(key, texture);
        Ok(())
    }

    /// Caches `texture` as the meta texture `ident` of `uri_or_path`.
    ///
    /// `destroy` runs when the meta entry is replaced or released.
    pub fn insert_meta(
        &self,
        uri_or_path: &str,
        ident: &str,
        texture: &Texture,
        destroy: Option<MetaDestroy>,
    ) -> CacheEntry {
        let key = Self::compat_key(uri_or_path)?;
        self.store
            .lock()
            .unwrap()
            .insert_meta(key, ident.into(), texture, destroy);
        Ok(())
    }

    /// Whether a texture is cached for `uri_or_path`.
    pub fn contains(&self, uri_or_path: &str) -> bool {
        Self::compat_key(uri_or_path).is_ok_and(|key| self.store.lock().unwrap().contains(&key))
    }

    pub fn contains_meta(&self, uri_or_path: &str, ident: &str) -> bool {
        Self::compat_key(uri_or_path)
            .is_ok_and(|key| self.store.lock().unwrap().contains_meta(&key, ident))
    }

    /// Whether the cache holds a resource for `key`, in any namespace.
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.store.lock().unwrap().contains(key)
    }

    /// The number of cache entries.
    pub fn size(&self) -> usize {
        self.store.lock().unwrap().size()
    }

    /// A renderable following the pixel buffer property `property` of `source`.
    pub fn bind_property<S>(&self, source: &Arc<S>, property: &str) -> Renderable
    where
        S: PixbufSource + 'static,
    {
        bind::bind_property(self.renderer.clone(), source, property)
    }

    /// Synchronously decodes encoded image `data` into a renderable of `size`x`size` pixels.
    ///
    /// Non-square images are centered within a transparent square. The texture is cached
    /// under the checksum of `data`.
    pub fn load_from_data(&self, data: &[u8], size: u32) -> CacheEntry<Renderable> {
        let key = CacheKey::compressed_checksum(data, size);
        let texture = match self.cached_texture(&key) {
            Some(texture) => texture,
            None => {
                let pixbuf = decode_image(self.decoder(), data, Bounds::square(size))?;
                let texture = texture_from_pixbuf(self.renderer(), &pixbuf, true)?;
                self.store_texture(key, &texture);
                texture
            }
        };

        let renderable = Renderable::from_texture(texture);
        renderable.set_size(size, size);
        Ok(renderable)
    }

    /// Creates a renderable from raw RGB or RGBA pixels, cached under their checksum.
    ///
    /// Pixels of different dimensions that happen to have the same bytes share a texture.
    pub fn load_from_raw(
        &self,
        data: &[u8],
        has_alpha: bool,
        width: u32,
        height: u32,
        rowstride: usize,
    ) -> CacheEntry<Renderable> {
        let key = CacheKey::raw_checksum(data);
        let texture = match self.cached_texture(&key) {
            Some(texture) => texture,
            None => {
                let pixbuf = PixelBuffer::new(width, height, rowstride, has_alpha, data.to_vec())?;
                let texture = texture_from_pixbuf(self.renderer(), &pixbuf, false)?;
                self.store_texture(key, &texture);
                texture
            }
        };

        let renderable = Renderable::from_texture(texture);
        renderable.set_size(width, height);
        Ok(renderable)
    }

    /// Starts loading the thumbnail of `uri` into a `size`x`size` renderable.
    ///
    /// Thumbnails are centered within a transparent square and cached forever.
    pub fn load_thumbnail(&self, size: u32, uri: &str, mime_type: &str) -> Renderable {
        let key = CacheKey::thumbnail(uri, size);
        let renderable = match self.cached_texture(&key) {
            Some(texture) => Renderable::from_texture(texture),
            None => {
                let renderable = Renderable::new_empty();
                let request = LoadRequest {
                    source: LoadSource::Thumbnail {
                        uri: uri.to_owned(),
                        mime_type: mime_type.to_owned(),
                    },
                    bounds: Bounds::square(size),
                    enforce_square: true,
                    policy: CachePolicy::Forever,
                };
                self.request(key, request, Sink::Renderable(renderable.downgrade()));
                renderable
            }
        };
        renderable.set_size(size, size);
        renderable
    }

    /// Starts loading the icon `name` of the configured [`IconTheme`].
    ///
    /// Icons are cached forever.
    pub fn load_icon(&self, name: &str, size: u32) -> Renderable {
        let key = CacheKey::icon(name, size);
        let renderable = match self.cached_texture(&key) {
            Some(texture) => Renderable::from_texture(texture),
            None => {
                let renderable = Renderable::new_empty();
                let request = LoadRequest {
                    source: LoadSource::Icon {
                        name: name.to_owned(),
                    },
                    bounds: Bounds::square(size),
                    enforce_square: false,
                    policy: CachePolicy::Forever,
                };
                self.request(key, request, Sink::Renderable(renderable.downgrade()));
                renderable
            }
        };
        renderable.set_size(size, size);
        renderable
    }

    /// Starts cutting the image at `path` into `grid_width`x`grid_height` slices.
    ///
    /// The returned group is filled with one hidden renderable per slice, in row major order.
    /// It stays empty if the load fails. Slices are not cached.
    pub fn load_sliced_image(
        &self,
        path: &Path,
        grid_width: u32,
        grid_height: u32,
    ) -> CacheEntry<SlicedImage> {
        let uri = file_uri(path)?;
        let key = CacheKey::sliced(&uri, grid_width, grid_height);

        let group = SlicedImage::new();
        let request = LoadRequest {
            source: LoadSource::Sliced {
                uri,
                grid_width,
                grid_height,
            },
            bounds: Bounds::UNBOUNDED,
            enforce_square: false,
            policy: CachePolicy::None,
        };
        self.request(key, request, Sink::Slices(group.downgrade()));
        Ok(group)
    }

    /// Registers the images of a legacy atlas cache file.
    ///
    /// The atlas itself is loaded through [`get_texture`](Self::get_texture). Nothing happens
    /// if the atlas is cached already, and images that are cached already are skipped. A
    /// missing or unreadable file is ignored.
    ///
    /// Returns the number of registered images.
    pub fn load_legacy_cache_file(&self, path: &Path) -> usize {
        let records = match legacy::read_cache_file(path) {
            Ok(records) => records,
            Err(error) => {
                tracing::debug!(path = %path.display(), %error, "cannot read legacy cache file");
                return 0;
            }
        };
        let mut records = records.into_iter();
        let Some(head) = records.next() else {
            return 0;
        };

        if self.contains(&head.filename) {
            return 0;
        }
        let atlas = match self.get_texture(&head.filename) {
            Ok(atlas) => atlas,
            Err(error) => {
                tracing::error!(
                    path = %path.display(),
                    %error,
                    "failed to load legacy cache image"
                );
                return 0;
            }
        };

        let mut registered = 0;
        for record in records {
            let Ok(key) = Self::compat_key(&record.filename) else {
                continue;
            };
            if self.contains_key(&key) {
                continue;
            }
            let texture = match record.region() {
                RecordRegion::Whole => atlas.clone(),
                RecordRegion::Rect {
                    x,
                    y,
                    width,
                    height,
                } => match self.renderer.sub_texture(&atlas, x, y, width, height) {
                    Ok(texture) => texture,
                    Err(error) => {
                        tracing::warn!(
                            filename = %record.filename,
                            %error,
                            "invalid legacy cache record"
                        );
                        continue;
                    }
                },
                RecordRegion::Invalid => {
                    tracing::warn!(filename = %record.filename, "invalid legacy cache record");
                    continue;
                }
            };
            self.store_texture(key, &texture);
            registered += 1;
        }
        tracing::debug!(path = %path.display(), registered, "loaded legacy cache file");
        registered
    }

    /// Looks up the custom key `name`, creating the texture with `loader` on a miss.
    ///
    /// The loader receives `name`. With [`CachePolicy::None`], the cache is neither
    /// consulted nor populated.
    pub fn load_with<F>(&self, name: &str, policy: CachePolicy, loader: F) -> CacheEntry<Texture>
    where
        F: FnOnce(&dyn Renderer, &str) -> CacheEntry<Texture>,
    {
        let key = CacheKey::custom(name);
        if policy != CachePolicy::None {
            if let Some(texture) = self.cached_texture(&key) {
                return Ok(texture);
            }
        }

        let texture = loader(self.renderer(), name)?;
        if policy == CachePolicy::Forever {
            self.store_texture(key, &texture);
        }
        Ok(texture)
    }

    /// Delivers the results of all finished asynchronous loads.
    ///
    /// This must be called regularly from the coordinating thread. Returns the number of
    /// finished loads.
    pub fn dispatch_completions(&self) -> usize {
        self.coordinator
            .dispatch_completions(&self.store, self.renderer())
    }

    /// Blocks until all outstanding asynchronous loads are delivered.
    pub fn wait_for_pending(&self) -> usize {
        self.coordinator.wait_for_pending(&self.store, self.renderer())
    }

    /// The number of outstanding asynchronous loads.
    pub fn pending_count(&self) -> usize {
        self.coordinator.pending_count()
    }

    /// Releases every cache entry.
    pub fn teardown(&self) {
        self.store.lock().unwrap().teardown();
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        self.teardown();
    }
}
