use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;

use texcache::TextureCache;
use texcache::config::Config;
use texcache::pixbuf::file_uri;
use texcache_test::{CountingDecoder, TempDir};

/// A texture cache together with everything it needs to stay alive.
pub struct Harness {
    pub cache: TextureCache,
    pub decoder: Arc<CountingDecoder>,
    pub dir: TempDir,
    _runtime: Runtime,
}

impl Harness {
    /// Writes a PNG fixture into the temp directory.
    pub fn png(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let png = texcache_test::png_bytes(width, height);
        texcache_test::write_fixture(self.dir.path(), name, &png)
    }

    /// Replaces the cache with the result of `f`, for use with the cache's builder methods.
    pub fn map_cache(self, f: impl FnOnce(TextureCache) -> TextureCache) -> Self {
        let Harness {
            cache,
            decoder,
            dir,
            _runtime,
        } = self;
        Harness {
            cache: f(cache),
            decoder,
            dir,
            _runtime,
        }
    }

    /// The `file://` URI of `path`.
    pub fn uri(&self, path: &Path) -> String {
        file_uri(path).unwrap()
    }
}

/// Creates a cache decoding through a [`CountingDecoder`], with thumbnails disabled.
pub fn setup_cache() -> Harness {
    setup_cache_with(|_, config| config)
}

/// Like [`setup_cache`], with the config adjusted by `f` which receives the temp directory.
pub fn setup_cache_with(f: impl FnOnce(&Path, Config) -> Config) -> Harness {
    texcache_test::setup();
    let dir = texcache_test::tempdir();
    let runtime = texcache_test::decode_pool();
    let decoder = CountingDecoder::new();

    let config = f(dir.path(), texcache_test::config(None));
    let cache = texcache_test::texture_cache(&runtime, &config, decoder.clone());

    Harness {
        cache,
        decoder,
        dir,
        _runtime: runtime,
    }
}
