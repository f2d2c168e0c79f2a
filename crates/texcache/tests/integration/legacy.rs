use std::path::Path;

use texcache::legacy::{LegacyRecord, RECORD_SIZE};
use texcache::texture::SoftwareRenderer;

use crate::setup_cache;

fn record(filename: &Path, width: i32, height: i32, pos_x: i32, pos_y: i32) -> LegacyRecord {
    LegacyRecord {
        filename: filename.to_str().unwrap().to_owned(),
        width,
        height,
        pos_x,
        pos_y,
    }
}

fn write_cache_file(path: &Path, records: &[LegacyRecord]) {
    let contents: Vec<u8> = records.iter().flat_map(|record| record.encode()).collect();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_registers_sub_textures() {
    let harness = setup_cache();
    let atlas = harness.png("atlas.png", 4, 2);
    let dir = harness.dir.path();
    let cache_file = dir.join("atlas.cache");
    write_cache_file(
        &cache_file,
        &[
            record(&atlas, 4, 2, -1, 0),
            record(&dir.join("left.png"), 2, 2, 0, 0),
            record(&dir.join("right.png"), 2, 2, 2, 0),
            record(&dir.join("all.png"), 4, 2, -1, 0),
        ],
    );

    assert_eq!(harness.cache.load_legacy_cache_file(&cache_file), 3);
    assert!(harness.cache.contains(atlas.to_str().unwrap()));
    assert_eq!(harness.cache.size(), 4);
    assert_eq!(harness.decoder.calls(), 1);

    let right = harness.cache.get_texture(dir.join("right.png").to_str().unwrap()).unwrap();
    assert_eq!((right.width(), right.height()), (2, 2));
    let renderer = SoftwareRenderer::new();
    let atlas_texture = harness.cache.get_texture(atlas.to_str().unwrap()).unwrap();
    let atlas_pixels = renderer.read_pixels(&atlas_texture).unwrap();
    let right_pixels = renderer.read_pixels(&right).unwrap();
    // the first row of the right half of the atlas
    assert_eq!(&right_pixels[..8], &atlas_pixels[8..16]);

    let all = harness.cache.get_texture(dir.join("all.png").to_str().unwrap()).unwrap();
    assert_eq!((all.width(), all.height()), (4, 2));

    // loading the same file again is a no-op
    assert_eq!(harness.cache.load_legacy_cache_file(&cache_file), 0);
    assert_eq!(harness.decoder.calls(), 1);
}

#[test]
fn test_skips_cached_images() {
    let harness = setup_cache();
    let atlas = harness.png("atlas.png", 4, 2);
    let own = harness.png("left.png", 1, 1);
    let cache_file = harness.dir.path().join("atlas.cache");
    write_cache_file(
        &cache_file,
        &[record(&atlas, 4, 2, -1, 0), record(&own, 2, 2, 0, 0)],
    );

    let texture = harness.cache.get_texture(own.to_str().unwrap()).unwrap();
    assert_eq!(harness.cache.load_legacy_cache_file(&cache_file), 0);

    let cached = harness.cache.get_texture(own.to_str().unwrap()).unwrap();
    assert!(cached.same_resource(&texture));
}

#[test]
fn test_truncated_file() {
    let harness = setup_cache();
    let atlas = harness.png("atlas.png", 4, 2);
    let dir = harness.dir.path();
    let cache_file = dir.join("atlas.cache");

    let mut contents = Vec::new();
    contents.extend_from_slice(&record(&atlas, 4, 2, -1, 0).encode());
    contents.extend_from_slice(&record(&dir.join("left.png"), 2, 2, 0, 0).encode());
    let truncated = record(&dir.join("right.png"), 2, 2, 2, 0).encode();
    contents.extend_from_slice(&truncated[..RECORD_SIZE / 2]);
    std::fs::write(&cache_file, contents).unwrap();

    assert_eq!(harness.cache.load_legacy_cache_file(&cache_file), 1);
    assert!(harness.cache.contains(dir.join("left.png").to_str().unwrap()));
    assert!(!harness.cache.contains(dir.join("right.png").to_str().unwrap()));
}

#[test]
fn test_missing_and_broken_files() {
    let harness = setup_cache();
    let dir = harness.dir.path();

    assert_eq!(harness.cache.load_legacy_cache_file(&dir.join("missing.cache")), 0);

    let cache_file = dir.join("empty.cache");
    std::fs::write(&cache_file, b"").unwrap();
    assert_eq!(harness.cache.load_legacy_cache_file(&cache_file), 0);

    // the atlas image does not exist
    write_cache_file(
        &cache_file,
        &[
            record(&dir.join("atlas.png"), 4, 2, -1, 0),
            record(&dir.join("left.png"), 2, 2, 0, 0),
        ],
    );
    assert_eq!(harness.cache.load_legacy_cache_file(&cache_file), 0);
    assert_eq!(harness.cache.size(), 0);
}
