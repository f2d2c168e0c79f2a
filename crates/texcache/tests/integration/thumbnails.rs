use std::fs;
use std::path::Path;

use texcache::caching::CacheKey;
use texcache::renderable::OPAQUE;

use crate::{Harness, setup_cache, setup_cache_with};

fn setup_thumbnails() -> Harness {
    setup_cache_with(|dir, _| texcache_test::config(Some(&dir.join("thumbnails"))))
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[test]
fn test_thumbnail_is_generated_and_cached() {
    let harness = setup_thumbnails();
    let uri = harness.uri(&harness.png("photo.png", 32, 16));

    let renderable = harness.cache.load_thumbnail(16, &uri, "image/png");
    assert_eq!(renderable.opacity(), 0);
    assert_eq!(renderable.state().size, Some((16, 16)));
    harness.cache.wait_for_pending();

    let texture = renderable.texture().unwrap();
    assert_eq!((texture.width(), texture.height()), (16, 16));
    assert!(harness.cache.contains_key(&CacheKey::thumbnail(&uri, 16)));

    let thumbnails = harness.dir.path().join("thumbnails");
    assert_eq!(count_files(&thumbnails.join("large")), 1);

    let cached = harness.cache.load_thumbnail(16, &uri, "image/png");
    assert_eq!(cached.opacity(), OPAQUE);
    assert!(cached.texture().unwrap().same_resource(&texture));
    assert_eq!(harness.cache.pending_count(), 0);
}

#[test]
fn test_stored_thumbnail_is_reused() {
    let harness = setup_thumbnails();
    let uri = harness.uri(&harness.png("photo.png", 32, 16));

    harness.cache.load_thumbnail(16, &uri, "image/png");
    harness.cache.wait_for_pending();
    let decoded = harness.decoder.calls();

    // another size is another cache entry, but the stored thumbnail is decoded instead of
    // the source
    let renderable = harness.cache.load_thumbnail(8, &uri, "image/png");
    harness.cache.wait_for_pending();
    let texture = renderable.texture().unwrap();
    assert_eq!((texture.width(), texture.height()), (8, 8));
    assert_eq!(harness.decoder.calls(), decoded + 1);
}

#[test]
fn test_failed_thumbnail() {
    let harness = setup_thumbnails();
    let path = texcache_test::write_fixture(harness.dir.path(), "broken.png", b"garbage");
    let uri = harness.uri(&path);

    let renderable = harness.cache.load_thumbnail(16, &uri, "image/png");
    harness.cache.wait_for_pending();
    assert!(renderable.texture().is_none());
    assert!(!harness.cache.contains_key(&CacheKey::thumbnail(&uri, 16)));

    let failures = harness.dir.path().join("thumbnails").join("fail");
    assert_eq!(count_files(&failures), 1);

    let renderable = harness.cache.load_thumbnail(16, &uri, "image/png");
    harness.cache.wait_for_pending();
    assert!(renderable.texture().is_none());
    assert_eq!(count_files(&failures), 1);
}

#[test]
fn test_unsupported_thumbnails() {
    let harness = setup_thumbnails();
    let path = texcache_test::write_fixture(harness.dir.path(), "notes.txt", b"hello");

    let renderable = harness
        .cache
        .load_thumbnail(16, &harness.uri(&path), "text/plain");
    harness.cache.wait_for_pending();
    assert!(renderable.texture().is_none());

    // without a thumbnail directory, thumbnails are disabled
    let harness = setup_cache();
    let uri = harness.uri(&harness.png("photo.png", 4, 4));
    let renderable = harness.cache.load_thumbnail(16, &uri, "image/png");
    harness.cache.wait_for_pending();
    assert!(renderable.texture().is_none());
}
