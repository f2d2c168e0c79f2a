//! A cache of textures decoded from image files, URIs and in-memory image data.
//!
//! The entry point is the [`TextureCache`](service::TextureCache). Decoding happens on a
//! separate tokio runtime, while textures are created and cached on the thread that drives
//! the cache.

#[macro_use]
pub mod metrics;

pub mod bind;
pub mod caching;
pub mod config;
pub mod icons;
pub mod legacy;
pub mod logging;
pub mod pixbuf;
pub mod renderable;
pub mod service;
pub mod texture;
pub mod thumbnails;
pub mod utils;

pub use service::TextureCache;
