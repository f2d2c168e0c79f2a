use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::icons::IconTheme;
use crate::pixbuf::{Bounds, Decoder, PixelBuffer, file_uri, load_uri};
use crate::renderable::{Renderable, WeakRenderable, WeakSlicedImage};
use crate::texture::{Renderer, Texture, texture_from_pixbuf};
use crate::thumbnails::{ThumbnailFactory, load_thumbnail};
use crate::utils::defer::defer;

use super::{CacheEntry, CacheError, CacheKey, CachePolicy, CacheStore, CachedResource};

/// What an asynchronous load reads its image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// The image behind a `file://` or `data:` URI.
    Uri(String),
    /// The thumbnail of a URI, as produced by the [`ThumbnailFactory`].
    Thumbnail { uri: String, mime_type: String },
    /// A named icon of the [`IconTheme`].
    Icon { name: String },
    /// An image that is cut into `grid_width`x`grid_height` slices.
    Sliced {
        uri: String,
        grid_width: u32,
        grid_height: u32,
    },
}

/// The collaborators decode workers load images with.
#[derive(Clone)]
pub struct Loaders {
    pub decoder: Arc<dyn Decoder>,
    pub thumbnails: Option<Arc<dyn ThumbnailFactory>>,
    pub icons: Option<Arc<dyn IconTheme>>,
}

impl LoadSource {
    fn kind(&self) -> &'static str {
        match self {
            Self::Uri(_) => "uri",
            Self::Thumbnail { .. } => "thumbnail",
            Self::Icon { .. } => "icon",
            Self::Sliced { .. } => "sliced",
        }
    }

    /// Reads and decodes the image. This runs on a decode worker.
    fn load(&self, loaders: &Loaders, bounds: Bounds) -> CacheEntry<PixelBuffer> {
        let decoder = loaders.decoder.as_ref();
        match self {
            Self::Uri(uri) | Self::Sliced { uri, .. } => load_uri(decoder, uri, bounds),
            Self::Thumbnail { uri, mime_type } => {
                let factory = loaders.thumbnails.as_deref().ok_or_else(|| {
                    CacheError::ThumbnailFailed("thumbnails are not configured".into())
                })?;
                let size = bounds.width.or(bounds.height).unwrap_or(u32::MAX);
                load_thumbnail(factory, decoder, uri, mime_type, size)
            }
            Self::Icon { name } => {
                let size = bounds.width.or(bounds.height).unwrap_or(u32::MAX);
                let path = loaders
                    .icons
                    .as_deref()
                    .and_then(|theme| theme.lookup_icon(name, size))
                    .ok_or(CacheError::NotFound)?;
                load_uri(decoder, &file_uri(&path)?, bounds)
            }
        }
    }
}

/// The parameters of an asynchronous load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub source: LoadSource,
    pub bounds: Bounds,
    /// Center the image within a transparent square texture.
    pub enforce_square: bool,
    pub policy: CachePolicy,
}

/// A consumer waiting for an asynchronous load.
pub enum Sink {
    /// Shows the texture, unless the renderable was destroyed in the meantime.
    Renderable(WeakRenderable),
    /// Receives the texture, or `None` if the load failed.
    Channel(oneshot::Sender<Option<Texture>>),
    /// Receives one hidden renderable per slice.
    Slices(WeakSlicedImage),
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Renderable(renderable) => f.debug_tuple("Renderable").field(renderable).finish(),
            Self::Channel(_) => f.debug_tuple("Channel").finish(),
            Self::Slices(group) => f.debug_tuple("Slices").field(group).finish(),
        }
    }
}

/// What a finished load hands to its sinks.
enum Delivery {
    Texture(Texture),
    Slices {
        textures: Vec<Texture>,
        grid_width: u32,
        grid_height: u32,
    },
}

impl Sink {
    fn deliver(self, delivery: Option<&Delivery>) {
        match (self, delivery) {
            (Self::Renderable(weak), Some(Delivery::Texture(texture))) => match weak.upgrade() {
                Some(renderable) => renderable.set_texture(Some(texture.clone())),
                None => tracing::trace!("renderable destroyed before its texture was loaded"),
            },
            (Self::Channel(sender), Some(Delivery::Texture(texture))) => {
                // the receiver may be gone already
                let _ = sender.send(Some(texture.clone()));
            }
            (Self::Channel(sender), _) => {
                let _ = sender.send(None);
            }
            (
                Self::Slices(weak),
                Some(Delivery::Slices {
                    textures,
                    grid_width,
                    grid_height,
                }),
            ) => {
                let Some(group) = weak.upgrade() else {
                    tracing::trace!("sliced image destroyed before it was loaded");
                    return;
                };
                for texture in textures {
                    let slice = Renderable::from_texture(texture.clone());
                    slice.set_size(*grid_width, *grid_height);
                    slice.set_visible(false);
                    group.push(slice);
                }
            }
            // failed loads leave renderables transparent
            (Self::Renderable(_) | Self::Slices(_), _) => {}
        }
    }
}

/// An outstanding asynchronous load and everyone waiting for it.
#[derive(Debug)]
struct PendingRequest {
    request: LoadRequest,
    sinks: Vec<Sink>,
}

impl PendingRequest {
    /// Creates the textures for a decoded image. This runs on the coordinating thread.
    fn convert(&self, renderer: &dyn Renderer, pixbuf: PixelBuffer) -> CacheEntry<Delivery> {
        let LoadSource::Sliced {
            grid_width,
            grid_height,
            ..
        } = self.request.source
        else {
            let texture = texture_from_pixbuf(renderer, &pixbuf, self.request.enforce_square)?;
            return Ok(Delivery::Texture(texture));
        };

        if grid_width == 0 || grid_height == 0 {
            return Err(CacheError::Unsupported("empty slice grid".into()));
        }
        let mut textures = Vec::new();
        for y in (0..pixbuf.height()).step_by(grid_height as usize) {
            for x in (0..pixbuf.width()).step_by(grid_width as usize) {
                let slice = pixbuf.region(x, y, grid_width, grid_height);
                textures.push(texture_from_pixbuf(renderer, &slice, false)?);
            }
        }
        Ok(Delivery::Slices {
            textures,
            grid_width,
            grid_height,
        })
    }
}

/// The message a decode worker sends back once it is done.
struct Completion {
    key: CacheKey,
    result: CacheEntry<PixelBuffer>,
}

/// Coalesces asynchronous loads and fans out their results.
///
/// There is at most one outstanding load per [`CacheKey`]; requesting a key that is already
/// being loaded only registers another [`Sink`]. Decoding happens on the `cpu_pool`, while
/// everything else, in particular creating textures and touching the [`CacheStore`], happens
/// on the coordinating thread when it calls [`dispatch_completions`](Self::dispatch_completions).
pub struct LoadCoordinator {
    pending: Mutex<HashMap<CacheKey, PendingRequest>>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: Mutex<mpsc::UnboundedReceiver<Completion>>,
    cpu_pool: Handle,
    loaders: Loaders,
}

impl fmt::Debug for LoadCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCoordinator")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl LoadCoordinator {
    pub fn new(cpu_pool: Handle, loaders: Loaders) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            pending: Mutex::new(HashMap::new()),
            completions_tx,
            completions_rx: Mutex::new(completions_rx),
            cpu_pool,
            loaders,
        }
    }

    pub fn loaders(&self) -> &Loaders {
        &self.loaders
    }

    /// Requests `key` to be loaded according to `request`, and `sink` to be notified of the
    /// result.
    ///
    /// Returns `true` if a new load was started, and `false` if `sink` was attached to a load
    /// that is already outstanding.
    pub fn request_async(&self, key: CacheKey, request: LoadRequest, sink: Sink) -> bool {
        let mut pending = self.pending.lock().unwrap();
        let entry = match pending.entry(key) {
            Entry::Occupied(mut entry) => {
                tracing::trace!(key = %entry.key(), "attaching to outstanding load");
                crate::metric!(counter("texcache.coalesced") += 1);
                entry.get_mut().sinks.push(sink);
                return false;
            }
            Entry::Vacant(entry) => entry,
        };

        let key = entry.key().clone();
        let source = request.source.clone();
        let bounds = request.bounds;
        entry.insert(PendingRequest {
            request,
            sinks: vec![sink],
        });
        drop(pending);

        tracing::trace!(%key, "starting load");
        let loaders = self.loaders.clone();
        let tx = self.completions_tx.clone();
        // dropping the task without finishing it, because it panicked or its runtime is
        // shut down, still completes the load
        let guard = defer({
            let tx = tx.clone();
            let key = key.clone();
            move || {
                tracing::error!(%key, "decode task dropped before finishing");
                let _ = tx.send(Completion {
                    key,
                    result: Err(CacheError::InternalError),
                });
            }
        });
        self.cpu_pool.spawn(async move {
            let started = Instant::now();
            let result = source.load(&loaders, bounds);
            guard.disarm();
            crate::metric!(
                timer("texcache.load.duration") = started.elapsed(),
                "source" => source.kind()
            );
            // fails only once the coordinator is gone
            let _ = tx.send(Completion { key, result });
        });
        true
    }

    /// Whether a load for `key` is outstanding.
    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.pending.lock().unwrap().contains_key(key)
    }

    /// The number of outstanding loads.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Finishes all loads whose decoding is done, without blocking.
    ///
    /// Returns the number of finished loads.
    pub fn dispatch_completions(
        &self,
        store: &Mutex<CacheStore>,
        renderer: &dyn Renderer,
    ) -> usize {
        let mut finished = 0;
        loop {
            let next = self.completions_rx.lock().unwrap().try_recv();
            let Ok(completion) = next else {
                return finished;
            };
            self.complete(completion, store, renderer);
            finished += 1;
        }
    }

    /// Blocks until every outstanding load is finished.
    ///
    /// This must not be called from within an asynchronous context.
    pub fn wait_for_pending(&self, store: &Mutex<CacheStore>, renderer: &dyn Renderer) -> usize {
        let mut finished = 0;
        while self.pending_count() > 0 {
            let next = self.completions_rx.lock().unwrap().blocking_recv();
            let Some(completion) = next else {
                break;
            };
            self.complete(completion, store, renderer);
            finished += 1;
        }
        finished + self.dispatch_completions(store, renderer)
    }

    fn complete(&self, completion: Completion, store: &Mutex<CacheStore>, renderer: &dyn Renderer) {
        let Completion { key, result } = completion;
        let Some(pending) = self.pending.lock().unwrap().remove(&key) else {
            tracing::debug!(%key, "completion without outstanding load");
            return;
        };

        let delivery = result.and_then(|pixbuf| pending.convert(renderer, pixbuf));
        let waiters = pending.sinks.len();
        match delivery {
            Ok(delivery) => {
                if let (CachePolicy::Forever, Delivery::Texture(texture)) =
                    (pending.request.policy, &delivery)
                {
                    let resource = CachedResource::Texture(texture.clone());
                    store.lock().unwrap().insert_if_absent(key.clone(), resource);
                }
                tracing::trace!(%key, waiters, "load finished");
                for sink in pending.sinks {
                    sink.deliver(Some(&delivery));
                }
            }
            Err(error) => {
                tracing::warn!(%key, %error, waiters, "failed to load image");
                crate::metric!(
                    counter("texcache.decode.failed") += 1,
                    "reason" => error.metrics_tag()
                );
                for sink in pending.sinks {
                    sink.deliver(None);
                }
            }
        }
    }
}
