use texcache::caching::{CacheError, CachePolicy};
use texcache::pixbuf::Bounds;
use texcache::texture::SoftwareRenderer;

use crate::setup_cache;

#[test]
fn test_data_uri_matches_file() {
    let harness = setup_cache();
    let png = texcache_test::png_bytes(5, 3);
    let file = texcache_test::write_fixture(harness.dir.path(), "a.png", &png);
    let data_uri = texcache_test::data_uri("image/png", &png);

    let from_file = harness.cache.load_file_to_texture(&file).unwrap();
    let from_data = harness
        .cache
        .load_uri_sync_to_texture(CachePolicy::None, &data_uri, Bounds::UNBOUNDED)
        .unwrap();

    let renderer = SoftwareRenderer::new();
    assert_eq!(
        renderer.read_pixels(&from_data).unwrap(),
        renderer.read_pixels(&from_file).unwrap()
    );
    assert_eq!((from_data.width(), from_data.height()), (5, 3));
}

#[test]
fn test_data_uri_async() {
    let harness = setup_cache();
    let data_uri = texcache_test::data_uri("image/png", &texcache_test::png_bytes(2, 2));

    let renderable = harness.cache.load_uri_async(&data_uri, Bounds::UNBOUNDED);
    harness.cache.wait_for_pending();
    assert!(renderable.texture().is_some());
}

#[test]
fn test_unsupported_media_type() {
    let harness = setup_cache();
    let jpeg = texcache_test::jpeg_with_orientation(2, 2, 1);
    let data_uri = texcache_test::data_uri("image/jpeg", &jpeg);

    let err = harness
        .cache
        .load_uri_sync(CachePolicy::None, &data_uri, Bounds::UNBOUNDED)
        .unwrap_err();
    assert!(matches!(err, CacheError::Unsupported(_)));
    assert_eq!(harness.decoder.calls(), 0);
}
