//! Textures that follow a pixel buffer property of another object.
//!
//! [`bind_property`] creates a [`Renderable`] that always shows the current value of a
//! property. The binding holds neither side alive: it goes away together with the
//! renderable, and a destroyed source simply stops sending updates.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::pixbuf::PixelBuffer;
use crate::renderable::Renderable;
use crate::texture::{Renderer, texture_from_pixbuf};

/// Identifies a change handler registered with a [`PixbufSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Called with the source after one of its properties changed.
pub type NotifyHandler = Arc<dyn Fn(&dyn PixbufSource) + Send + Sync>;

/// An object with observable pixel buffer properties.
pub trait PixbufSource: Send + Sync {
    /// The current value of the property `name`.
    fn pixbuf_property(&self, name: &str) -> Option<PixelBuffer>;

    /// Registers `handler` to be called whenever the property `name` changes.
    fn connect_notify(&self, name: &str, handler: NotifyHandler) -> HandlerId;

    /// Removes a handler registered with [`connect_notify`](Self::connect_notify).
    fn disconnect(&self, id: HandlerId);
}

/// Shows `pixbuf` on `renderable`, or makes it transparent if there is none.
fn reset_texture(renderer: &dyn Renderer, renderable: &Renderable, pixbuf: Option<PixelBuffer>) {
    let texture = pixbuf.and_then(|pixbuf| match texture_from_pixbuf(renderer, &pixbuf, false) {
        Ok(texture) => Some(texture),
        Err(error) => {
            tracing::warn!(%error, "failed to create texture for bound property");
            None
        }
    });
    renderable.set_texture(texture);
}

/// Creates a renderable mirroring the pixel buffer property `property` of `source`.
///
/// The renderable starts out transparent if the property has no value.
pub fn bind_property<S>(
    renderer: Arc<dyn Renderer>,
    source: &Arc<S>,
    property: &str,
) -> Renderable
where
    S: PixbufSource + 'static,
{
    let renderable = Renderable::new_empty();
    reset_texture(renderer.as_ref(), &renderable, source.pixbuf_property(property));

    let weak_renderable = renderable.downgrade();
    let name = property.to_owned();
    let handler: NotifyHandler = Arc::new(move |source| {
        if let Some(renderable) = weak_renderable.upgrade() {
            reset_texture(renderer.as_ref(), &renderable, source.pixbuf_property(&name));
        }
    });
    let id = source.connect_notify(property, handler);

    let weak_source = Arc::downgrade(source);
    renderable.on_destroy(move || {
        if let Some(source) = weak_source.upgrade() {
            source.disconnect(id);
        }
    });

    renderable
}

#[derive(Default)]
struct PropertyState {
    values: HashMap<String, PixelBuffer>,
    handlers: Vec<(HandlerId, String, NotifyHandler)>,
    next_id: u64,
}

/// A simple [`PixbufSource`] holding named pixel buffer properties.
#[derive(Default)]
pub struct PropertyObject {
    state: Mutex<PropertyState>,
}

impl fmt::Debug for PropertyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("PropertyObject")
            .field("properties", &state.values.keys().collect::<Vec<_>>())
            .field("handlers", &state.handlers.len())
            .finish()
    }
}

impl PropertyObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the property `name` and notifies its handlers.
    pub fn set(&self, name: &str, value: Option<PixelBuffer>) {
        let handlers: Vec<_> = {
            let mut state = self.state.lock().unwrap();
            match value {
                Some(value) => state.values.insert(name.to_owned(), value),
                None => state.values.remove(name),
            };
            state
                .handlers
                .iter()
                .filter(|(_, property, _)| property == name)
                .map(|(_, _, handler)| handler.clone())
                .collect()
        };
        // handlers are called without holding the lock, they may disconnect themselves
        for handler in handlers {
            handler(self);
        }
    }

    /// The number of connected handlers.
    pub fn handler_count(&self) -> usize {
        self.state.lock().unwrap().handlers.len()
    }
}

impl PixbufSource for PropertyObject {
    fn pixbuf_property(&self, name: &str) -> Option<PixelBuffer> {
        self.state.lock().unwrap().values.get(name).cloned()
    }

    fn connect_notify(&self, name: &str, handler: NotifyHandler) -> HandlerId {
        let mut state = self.state.lock().unwrap();
        let id = HandlerId(state.next_id);
        state.next_id += 1;
        state.handlers.push((id, name.to_owned(), handler));
        id
    }

    fn disconnect(&self, id: HandlerId) {
        self.state
            .lock()
            .unwrap()
            .handlers
            .retain(|(handler_id, _, _)| *handler_id != id);
    }
}
