//! The scene graph facing side of a texture.
//!
//! A [`Renderable`] is what the cache hands out to UI code. It shows one [`Texture`] at a
//! time, and the texture can be replaced in place, for example once an asynchronous load has
//! finished. Renderables that wait for a texture start out fully transparent.
//!
//! The cache itself only ever holds [`WeakRenderable`]s, so dropping the last [`Renderable`]
//! handle destroys it even while a load for it is still outstanding.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::texture::Texture;

/// Opacity of a renderable that shows its texture.
pub const OPAQUE: u8 = 255;

/// The visual state of a [`Renderable`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableState {
    pub texture: Option<Texture>,
    pub opacity: u8,
    pub keep_aspect_ratio: bool,
    pub visible: bool,
    /// The preferred size, if it differs from the size of the texture.
    pub size: Option<(u32, u32)>,
}

type DestroyNotify = Box<dyn FnOnce() + Send>;

struct RenderableInner {
    state: Mutex<RenderableState>,
    destroy_notify: Mutex<Vec<DestroyNotify>>,
}

impl Drop for RenderableInner {
    fn drop(&mut self) {
        let callbacks = std::mem::take(self.destroy_notify.get_mut().unwrap());
        for callback in callbacks {
            callback();
        }
    }
}

/// A scene graph node displaying a texture.
#[derive(Clone)]
pub struct Renderable(Arc<RenderableInner>);

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Renderable").field(&self.state()).finish()
    }
}

impl Renderable {
    fn with_state(state: RenderableState) -> Self {
        Self(Arc::new(RenderableInner {
            state: Mutex::new(state),
            destroy_notify: Mutex::new(Vec::new()),
        }))
    }

    /// A transparent renderable without texture that keeps the aspect ratio of whatever
    /// texture it eventually shows.
    pub fn new_empty() -> Self {
        Self::with_state(RenderableState {
            texture: None,
            opacity: 0,
            keep_aspect_ratio: true,
            visible: true,
            size: None,
        })
    }

    /// An opaque renderable showing `texture`.
    pub fn from_texture(texture: Texture) -> Self {
        let renderable = Self::new_empty();
        renderable.set_texture(Some(texture));
        renderable
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> RenderableState {
        self.0.state.lock().unwrap().clone()
    }

    pub fn texture(&self) -> Option<Texture> {
        self.0.state.lock().unwrap().texture.clone()
    }

    pub fn opacity(&self) -> u8 {
        self.0.state.lock().unwrap().opacity
    }

    /// Shows `texture`, or nothing at all if it is `None`.
    ///
    /// Showing a texture makes the renderable opaque, removing it makes it transparent.
    pub fn set_texture(&self, texture: Option<Texture>) {
        let mut state = self.0.state.lock().unwrap();
        state.opacity = if texture.is_some() { OPAQUE } else { 0 };
        state.texture = texture;
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.0.state.lock().unwrap().size = Some((width, height));
    }

    pub fn set_visible(&self, visible: bool) {
        self.0.state.lock().unwrap().visible = visible;
    }

    /// Registers `callback` to run once this renderable is destroyed.
    pub fn on_destroy(&self, callback: impl FnOnce() + Send + 'static) {
        self.0
            .destroy_notify
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    pub fn downgrade(&self) -> WeakRenderable {
        WeakRenderable(Arc::downgrade(&self.0))
    }

    /// Whether both handles refer to the same renderable.
    pub fn ptr_eq(&self, other: &Renderable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A handle to a [`Renderable`] that does not keep it alive.
#[derive(Clone)]
pub struct WeakRenderable(Weak<RenderableInner>);

impl fmt::Debug for WeakRenderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakRenderable")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

impl WeakRenderable {
    /// The renderable, unless it was destroyed in the meantime.
    pub fn upgrade(&self) -> Option<Renderable> {
        self.0.upgrade().map(Renderable)
    }
}

/// A group of renderables that is filled in once an image was cut into slices.
#[derive(Clone, Default)]
pub struct SlicedImage(Arc<Mutex<Vec<Renderable>>>);

impl fmt::Debug for SlicedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlicedImage")
            .field("slices", &self.len())
            .finish()
    }
}

impl SlicedImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slices in row major order.
    pub fn children(&self) -> Vec<Renderable> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&self, child: Renderable) {
        self.0.lock().unwrap().push(child);
    }

    pub fn downgrade(&self) -> WeakSlicedImage {
        WeakSlicedImage(Arc::downgrade(&self.0))
    }
}

/// A handle to a [`SlicedImage`] that does not keep it alive.
#[derive(Debug, Clone)]
pub struct WeakSlicedImage(Weak<Mutex<Vec<Renderable>>>);

impl WeakSlicedImage {
    pub fn upgrade(&self) -> Option<SlicedImage> {
        self.0.upgrade().map(SlicedImage)
    }
}
