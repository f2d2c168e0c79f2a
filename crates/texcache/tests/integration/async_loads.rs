use std::sync::Arc;

use texcache::caching::{CacheKey, CachePolicy};
use texcache::icons::DirectoryIconTheme;
use texcache::pixbuf::Bounds;
use texcache::renderable::OPAQUE;

use crate::setup_cache;

#[test]
fn test_concurrent_requests_share_decode() {
    let harness = setup_cache();
    let uri = harness.uri(&harness.png("a.png", 8, 4));

    let first = harness.cache.load_uri_async(&uri, Bounds::UNBOUNDED);
    let second = harness.cache.load_uri_async(&uri, Bounds::UNBOUNDED);
    assert_eq!(first.opacity(), 0);
    assert_eq!(harness.cache.pending_count(), 1);

    harness.cache.wait_for_pending();
    assert_eq!(harness.decoder.calls(), 1);

    let texture = first.texture().unwrap();
    assert!(second.texture().unwrap().same_resource(&texture));
    assert_eq!(first.opacity(), OPAQUE);
    assert_eq!((texture.width(), texture.height()), (8, 4));

    // async loads by uri are never cached
    assert!(!harness.cache.contains_key(&CacheKey::uri(&uri)));
    assert_eq!(texture.ref_count(), 3);
}

#[test]
fn test_request_texture_forever() {
    let harness = setup_cache();
    let uri = harness.uri(&harness.png("a.png", 4, 4));

    let mut receiver = harness
        .cache
        .request_texture(CachePolicy::Forever, &uri, Bounds::UNBOUNDED);
    harness.cache.wait_for_pending();
    let texture = receiver.try_recv().unwrap().unwrap();
    assert!(harness.cache.contains_key(&CacheKey::uri(&uri)));

    let mut receiver = harness
        .cache
        .request_texture(CachePolicy::Forever, &uri, Bounds::UNBOUNDED);
    let cached = receiver.try_recv().unwrap().unwrap();
    assert!(cached.same_resource(&texture));
    assert_eq!(harness.decoder.calls(), 1);
    assert_eq!(harness.cache.pending_count(), 0);
}

#[test]
fn test_request_texture_none() {
    let harness = setup_cache();
    let uri = harness.uri(&harness.png("a.png", 4, 4));

    let mut receiver = harness
        .cache
        .request_texture(CachePolicy::None, &uri, Bounds::square(2));
    harness.cache.wait_for_pending();

    let texture = receiver.try_recv().unwrap().unwrap();
    assert_eq!((texture.width(), texture.height()), (2, 2));
    assert!(!harness.cache.contains_key(&CacheKey::uri(&uri)));
}

#[test]
fn test_failed_load_stays_transparent() {
    let harness = setup_cache();
    let uri = harness.uri(&harness.dir.path().join("missing.png"));

    let renderable = harness.cache.load_uri_async(&uri, Bounds::UNBOUNDED);
    let mut receiver = harness
        .cache
        .request_texture(CachePolicy::Forever, &uri, Bounds::UNBOUNDED);
    harness.cache.wait_for_pending();

    assert_eq!(receiver.try_recv().unwrap(), None);
    assert_eq!(renderable.opacity(), 0);
    assert!(renderable.texture().is_none());
    assert_eq!(harness.cache.size(), 0);
}

#[test]
fn test_destroyed_renderable_is_skipped() {
    let harness = setup_cache();
    let uri = harness.uri(&harness.png("a.png", 4, 4));

    let renderable = harness.cache.load_uri_async(&uri, Bounds::UNBOUNDED);
    let weak = renderable.downgrade();
    drop(renderable);

    assert_eq!(harness.cache.wait_for_pending(), 1);
    assert!(weak.upgrade().is_none());
    assert_eq!(harness.decoder.calls(), 1);
}

#[test]
fn test_dispatch_without_blocking() {
    let harness = setup_cache();
    assert_eq!(harness.cache.dispatch_completions(), 0);

    let uri = harness.uri(&harness.png("a.png", 4, 4));
    let renderable = harness.cache.load_uri_async(&uri, Bounds::UNBOUNDED);
    while harness.cache.pending_count() > 0 {
        harness.cache.dispatch_completions();
        std::thread::yield_now();
    }
    assert_eq!(renderable.opacity(), OPAQUE);
}

#[test]
fn test_sliced_image() {
    let harness = setup_cache();
    let path = harness.png("sheet.png", 6, 4);

    let group = harness.cache.load_sliced_image(&path, 2, 2).unwrap();
    assert!(group.is_empty());
    harness.cache.wait_for_pending();

    let slices = group.children();
    assert_eq!(slices.len(), 6);
    for slice in &slices {
        let state = slice.state();
        assert!(!state.visible);
        let texture = state.texture.unwrap();
        assert_eq!((texture.width(), texture.height()), (2, 2));
    }
    assert_eq!(harness.cache.size(), 0);
}

#[test]
fn test_icons() {
    let harness = setup_cache();
    let themes = harness.dir.path().join("icons");
    texcache_test::write_fixture(&themes, "16x16/folder.png", &texcache_test::png_bytes(16, 16));
    let theme = Arc::new(DirectoryIconTheme::new([themes]));
    let harness = harness.map_cache(|cache| cache.with_icon_theme(theme));

    let icon = harness.cache.load_icon("folder", 16);
    let missing = harness.cache.load_icon("missing", 16);
    harness.cache.wait_for_pending();

    let texture = icon.texture().unwrap();
    assert_eq!((texture.width(), texture.height()), (16, 16));
    assert_eq!(icon.state().size, Some((16, 16)));
    assert!(missing.texture().is_none());

    let cached = harness.cache.load_icon("folder", 16);
    assert!(cached.texture().unwrap().same_resource(&texture));
    assert_eq!(harness.decoder.calls(), 1);
}
