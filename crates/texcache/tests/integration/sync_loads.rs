use std::sync::{Arc, Mutex};

use texcache::caching::{CacheError, CacheKey, CachePolicy, MetaDestroy, MetaIdent};
use texcache::pixbuf::Bounds;
use texcache::renderable::OPAQUE;
use texcache::texture::PixelFormat;

use crate::setup_cache;

#[test]
fn test_forever_load_is_cached() {
    let harness = setup_cache();
    let path = harness.png("a.png", 4, 2);

    let first = harness.cache.load_file_to_texture(&path).unwrap();
    assert_eq!(first.ref_count(), 2);
    assert!(harness.cache.contains_key(&CacheKey::uri(&harness.uri(&path))));

    let second = harness.cache.load_file_to_texture(&path).unwrap();
    assert!(second.same_resource(&first));
    assert_eq!(first.ref_count(), 3);
    assert_eq!(harness.decoder.calls(), 1);
}

#[test]
fn test_policy_none_always_loads() {
    let harness = setup_cache();
    let uri = harness.uri(&harness.png("a.png", 4, 2));

    let first = harness
        .cache
        .load_uri_sync_to_texture(CachePolicy::None, &uri, Bounds::UNBOUNDED)
        .unwrap();
    let second = harness
        .cache
        .load_uri_sync(CachePolicy::None, &uri, Bounds::UNBOUNDED)
        .unwrap();

    assert!(!second.texture().unwrap().same_resource(&first));
    assert_eq!(first.ref_count(), 1);
    assert_eq!(harness.decoder.calls(), 2);
    assert_eq!(harness.cache.size(), 0);
}

#[test]
fn test_scaled_load() {
    let harness = setup_cache();
    let uri = harness.uri(&harness.png("wide.png", 200, 100));

    let texture = harness
        .cache
        .load_uri_sync_to_texture(CachePolicy::None, &uri, Bounds::new(Some(100), None))
        .unwrap();
    assert_eq!((texture.width(), texture.height()), (100, 50));

    // never scaled up
    let texture = harness
        .cache
        .load_uri_sync_to_texture(CachePolicy::None, &uri, Bounds::square(500))
        .unwrap();
    assert_eq!((texture.width(), texture.height()), (200, 100));
}

#[test]
fn test_rotated_jpeg_is_decoded_twice() {
    let harness = setup_cache();
    let jpeg = texcache_test::jpeg_with_orientation(8, 4, 6);
    let path = texcache_test::write_fixture(harness.dir.path(), "rotated.jpg", &jpeg);
    let uri = harness.uri(&path);

    let texture = harness
        .cache
        .load_uri_sync_to_texture(CachePolicy::None, &uri, Bounds::UNBOUNDED)
        .unwrap();
    assert_eq!((texture.width(), texture.height()), (4, 8));
    assert_eq!(texture.format(), PixelFormat::Rgb888);
    assert_eq!(harness.decoder.calls(), 1);

    let texture = harness
        .cache
        .load_uri_sync_to_texture(CachePolicy::None, &uri, Bounds::new(Some(2), None))
        .unwrap();
    assert_eq!((texture.width(), texture.height()), (2, 4));
    assert_eq!(harness.decoder.calls(), 3);
}

#[test]
fn test_sync_failure() {
    let harness = setup_cache();
    let missing = harness.dir.path().join("missing.png");

    let err = harness.cache.load_file_to_texture(&missing).unwrap_err();
    assert_eq!(err, CacheError::NotFound);

    let broken = texcache_test::write_fixture(harness.dir.path(), "broken.png", b"garbage");
    assert!(harness.cache.load_file_to_texture(&broken).is_err());
    assert_eq!(harness.cache.size(), 0);

    let err = harness
        .cache
        .load_uri_sync(CachePolicy::Forever, "https://example.com/a.png", Bounds::UNBOUNDED)
        .unwrap_err();
    assert!(matches!(err, CacheError::Unsupported(_)));

    let renderable = harness.cache.load_file_simple(&missing);
    assert_eq!(renderable.opacity(), 0);
    assert!(renderable.texture().is_none());
}

#[test]
fn test_load_file_simple() {
    let harness = setup_cache();
    let path = harness.png("a.png", 3, 3);

    let renderable = harness.cache.load_file_simple(&path);
    assert_eq!(renderable.opacity(), OPAQUE);
    assert!(renderable.state().keep_aspect_ratio);
}

#[test]
fn test_surface() {
    let harness = setup_cache();
    let path = harness.png("a.png", 3, 2);

    let surface = harness.cache.load_file_to_surface(&path).unwrap();
    assert_eq!((surface.width(), surface.height()), (3, 2));
    assert_eq!(surface.stride(), 12);
    assert!(harness
        .cache
        .contains_key(&CacheKey::uri_for_surface(&harness.uri(&path))));

    let again = harness.cache.load_file_to_surface(&path).unwrap();
    assert!(again.same_resource(&surface));
    assert_eq!(harness.decoder.calls(), 1);

    // textures and surfaces of the same file are cached separately
    harness.cache.load_file_to_texture(&path).unwrap();
    assert_eq!(harness.cache.size(), 2);
}

#[test]
fn test_insert_and_get() {
    let harness = setup_cache();
    let path = harness.png("a.png", 2, 2);
    let path_str = path.to_str().unwrap();

    let first = harness.cache.get_texture(path_str).unwrap();
    assert!(harness.cache.contains(path_str));
    assert!(harness.cache.contains(&harness.uri(&path)));

    let replacement = harness.cache.load_file_to_texture(&path).unwrap();
    assert_eq!(first.ref_count(), 2);
    harness.cache.insert(path_str, &replacement).unwrap();
    assert_eq!(first.ref_count(), 1);

    let fetched = harness.cache.get_renderable(path_str).unwrap();
    assert!(fetched.texture().unwrap().same_resource(&replacement));
    assert_eq!(harness.decoder.calls(), 2);
}

#[test]
fn test_meta_textures() {
    let harness = setup_cache();
    let path = harness.png("base.png", 2, 2);
    let path_str = path.to_str().unwrap();
    let variant = harness.cache.load_file_to_texture(&path).unwrap();
    let released = Arc::new(Mutex::new(Vec::new()));

    let destroy: MetaDestroy = {
        let released = released.clone();
        Box::new(move |ident: &MetaIdent| released.lock().unwrap().push(ident.to_string()))
    };
    harness
        .cache
        .insert_meta(path_str, "shadow", &variant, Some(destroy))
        .unwrap();

    assert!(harness.cache.contains_meta(path_str, "shadow"));
    assert!(!harness.cache.contains_meta(path_str, "glow"));
    assert!(!harness.cache.contains(path_str));
    let meta = harness.cache.get_meta_texture(path_str, "shadow").unwrap();
    assert!(meta.same_resource(&variant));
    assert!(harness.cache.get_meta_renderable(path_str, "glow").is_none());

    harness.cache.teardown();
    assert_eq!(*released.lock().unwrap(), ["shadow"]);
    assert_eq!(harness.cache.size(), 0);
    assert!(!harness.cache.contains_meta(path_str, "shadow"));
}

#[test]
fn test_load_from_data() {
    let harness = setup_cache();
    let png = texcache_test::png_bytes(32, 16);

    let renderable = harness.cache.load_from_data(&png, 16).unwrap();
    let texture = renderable.texture().unwrap();
    assert_eq!((texture.width(), texture.height()), (16, 16));
    assert_eq!(renderable.state().size, Some((16, 16)));
    assert!(harness.cache.contains_key(&CacheKey::compressed_checksum(&png, 16)));

    let again = harness.cache.load_from_data(&png, 16).unwrap();
    assert!(again.texture().unwrap().same_resource(&texture));
    assert_eq!(harness.decoder.calls(), 1);

    harness.cache.load_from_data(&png, 8).unwrap();
    assert_eq!(harness.decoder.calls(), 2);

    assert!(matches!(
        harness.cache.load_from_data(b"garbage", 16),
        Err(CacheError::Unsupported(_) | CacheError::Malformed(_))
    ));
}

#[test]
fn test_load_from_raw() {
    let harness = setup_cache();
    // 2x2 RGB with two bytes of row padding
    let data = [
        255, 0, 0, 0, 255, 0, 9, 9, //
        0, 0, 255, 255, 255, 255, 9, 9,
    ];

    let renderable = harness.cache.load_from_raw(&data, false, 2, 2, 8).unwrap();
    let texture = renderable.texture().unwrap();
    assert_eq!(texture.format(), PixelFormat::Rgb888);
    assert_eq!(renderable.state().size, Some((2, 2)));
    assert!(harness.cache.contains_key(&CacheKey::raw_checksum(&data)));

    let again = harness.cache.load_from_raw(&data, false, 2, 2, 8).unwrap();
    assert!(again.texture().unwrap().same_resource(&texture));
    assert_eq!(harness.decoder.calls(), 0);

    assert!(matches!(
        harness.cache.load_from_raw(&data[..10], false, 2, 2, 8),
        Err(CacheError::Malformed(_))
    ));
}

#[test]
fn test_load_with_custom_loader() {
    let harness = setup_cache();
    let calls = Mutex::new(0);
    let loader = |renderer: &dyn texcache::texture::Renderer, key: &str| {
        assert_eq!(key, "generated:checkerboard");
        *calls.lock().unwrap() += 1;
        renderer.texture_with_size(4, 4, PixelFormat::Rgba8888)
    };

    let first = harness
        .cache
        .load_with("generated:checkerboard", CachePolicy::Forever, loader)
        .unwrap();
    let second = harness
        .cache
        .load_with("generated:checkerboard", CachePolicy::Forever, loader)
        .unwrap();
    assert!(second.same_resource(&first));
    assert_eq!(*calls.lock().unwrap(), 1);

    harness
        .cache
        .load_with("generated:checkerboard", CachePolicy::None, loader)
        .unwrap();
    assert_eq!(*calls.lock().unwrap(), 2);

    let err = harness
        .cache
        .load_with("generated:none", CachePolicy::Forever, |_, _| Err(CacheError::NotFound))
        .unwrap_err();
    assert_eq!(err, CacheError::NotFound);
    assert!(!harness.cache.contains_key(&CacheKey::custom("generated:none")));
}

#[test]
fn test_custom_keys_do_not_alias_uri_keys() {
    let harness = setup_cache();
    let path = harness.png("a.png", 2, 2);
    let uri = harness.uri(&path);
    let cached = harness.cache.load_file_to_texture(&path).unwrap();

    let name = format!("uri:{uri}");
    let mut called = false;
    let err = harness
        .cache
        .load_with(&name, CachePolicy::Forever, |_, key| {
            assert_eq!(key, name);
            called = true;
            Err(CacheError::NotFound)
        })
        .unwrap_err();
    assert_eq!(err, CacheError::NotFound);
    assert!(called);

    let generated = harness
        .cache
        .load_with(&name, CachePolicy::Forever, |renderer, _| {
            renderer.texture_with_size(1, 1, PixelFormat::Rgba8888)
        })
        .unwrap();
    assert!(!generated.same_resource(&cached));
    assert!(harness.cache.contains_key(&CacheKey::custom(&name)));

    let reloaded = harness.cache.load_file_to_texture(&path).unwrap();
    assert!(reloaded.same_resource(&cached));
    assert_eq!(harness.cache.size(), 2);
}
