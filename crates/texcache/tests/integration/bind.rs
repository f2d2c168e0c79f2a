use std::sync::Arc;

use texcache::bind::PropertyObject;
use texcache::pixbuf::PixelBuffer;
use texcache::renderable::OPAQUE;

use crate::setup_cache;

fn pixbuf(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_image(texcache_test::image(width, height).into())
}

#[test]
fn test_bound_renderable_follows_property() {
    let harness = setup_cache();
    let source = Arc::new(PropertyObject::new());

    let renderable = harness.cache.bind_property(&source, "pixbuf");
    assert_eq!(renderable.opacity(), 0);

    source.set("pixbuf", Some(pixbuf(3, 2)));
    let texture = renderable.texture().unwrap();
    assert_eq!((texture.width(), texture.height()), (3, 2));
    assert_eq!(renderable.opacity(), OPAQUE);

    source.set("pixbuf", Some(pixbuf(1, 1)));
    let replaced = renderable.texture().unwrap();
    assert!(!replaced.same_resource(&texture));
    assert_eq!(texture.ref_count(), 1);

    source.set("pixbuf", None);
    assert_eq!(renderable.opacity(), 0);

    // bound textures are not cached
    assert_eq!(harness.cache.size(), 0);
}

#[test]
fn test_binding_lifetime() {
    let harness = setup_cache();
    let source = Arc::new(PropertyObject::new());
    source.set("pixbuf", Some(pixbuf(2, 2)));

    let first = harness.cache.bind_property(&source, "pixbuf");
    let second = harness.cache.bind_property(&source, "pixbuf");
    assert_eq!(first.opacity(), OPAQUE);
    assert_eq!(source.handler_count(), 2);
    // the bindings do not own the source
    assert_eq!(Arc::strong_count(&source), 1);

    drop(first);
    assert_eq!(source.handler_count(), 1);

    let weak = second.downgrade();
    drop(source);
    assert!(weak.upgrade().is_some());
    drop(second);
    assert!(weak.upgrade().is_none());
}
