mod common;

use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;

use ekitap_downloader::images::{CoverSource, ImageCache, ImageSize, RetryPolicy, placeholder};

use common::{MockHttp, png_bytes};

const COVER: &str = "https://covers.example/book.png";

fn no_delay() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::ZERO,
    }
}

fn cache_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("covers")).unwrap()
}

#[test]
fn second_resolve_hits_memory_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(COVER, png_bytes(4, 6, [200, 10, 10, 255]));
    let cache = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());
    let size = ImageSize::square(16);

    let first = cache.resolve(COVER, size);
    assert_eq!(first.source, CoverSource::Network);
    assert_eq!(first.bitmap.dimensions(), (16, 16));
    assert_eq!(http.calls(), 1);
    assert!(cache.cache_path(COVER).as_std_path().exists());

    let second = cache.resolve(COVER, size);
    assert_eq!(second.source, CoverSource::Memory);
    assert_eq!(*second.bitmap, *first.bitmap);
    assert_eq!(http.calls(), 1);
}

#[test]
fn fresh_cache_reads_disk_copy() {
    let dir = tempfile::tempdir().unwrap();
    let size = ImageSize::square(12);
    let http = MockHttp::new().with(COVER, png_bytes(12, 12, [0, 90, 180, 255]));
    let original = ImageCache::new(cache_dir(&dir), http.clone(), no_delay()).resolve(COVER, size);

    let offline = MockHttp::new();
    let reopened = ImageCache::new(cache_dir(&dir), offline.clone(), no_delay());
    let cover = reopened.resolve(COVER, size);

    assert_eq!(cover.source, CoverSource::Disk);
    assert_eq!(*cover.bitmap, *original.bitmap);
    assert_eq!(offline.calls(), 0);
}

#[test]
fn none_marker_gives_placeholder_without_writes() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new();
    let cache = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());
    let size = ImageSize::square(32);

    for url in ["", "none", "  NONE "] {
        let cover = cache.resolve(url, size);
        assert!(cover.is_placeholder());
        assert_eq!(*cover.bitmap, placeholder(size));
    }
    assert_eq!(http.calls(), 0);
    assert!(!dir.path().join("covers").exists());
}

#[test]
fn exhausted_retries_fall_back_to_unpersisted_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new();
    let cache = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());

    let cover = cache.resolve("https://covers.example/missing.png", ImageSize::square(20));

    assert_eq!(cover.source, CoverSource::Placeholder);
    assert_eq!(http.calls(), 3);
    assert!(
        !cache
            .cache_path("https://covers.example/missing.png")
            .as_std_path()
            .exists()
    );
}

#[test]
fn undecodable_bytes_count_as_failed_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(COVER, b"<html>not an image</html>".to_vec());
    let cache = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());

    let cover = cache.resolve(COVER, ImageSize::square(20));

    assert!(cover.is_placeholder());
    assert_eq!(http.calls(), 3);
}

#[test]
fn corrupt_cache_file_is_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(COVER, png_bytes(8, 8, [1, 2, 3, 255]));
    let cache = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());
    let path = cache.cache_path(COVER);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"garbage").unwrap();

    let cover = cache.resolve(COVER, ImageSize::square(8));

    assert_eq!(cover.source, CoverSource::Network);
    assert_eq!(http.calls(), 1);
    let rewritten = image::open(path.as_std_path()).unwrap();
    assert_eq!(rewritten.width(), 8);
}

#[test]
fn warm_resolves_each_item() {
    use ekitap_downloader::domain::CatalogItem;

    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(COVER, png_bytes(4, 4, [9, 9, 9, 255]));
    let cache = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());
    let items = ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(index, name)| CatalogItem {
            name: name.to_string(),
            download_url: String::new(),
            unlock_key: "none".to_string(),
            category: "1".to_string(),
            publisher: "N/A".to_string(),
            cover_image_url: if index == 2 {
                "none".to_string()
            } else {
                COVER.to_string()
            },
        })
        .collect::<Vec<_>>();

    let summary = cache.warm(&items, ImageSize::square(10));

    assert_eq!(summary.placeholder, 1);
    assert_eq!(summary.memory + summary.disk + summary.network, 2);
}

#[test]
fn unremovable_cache_entry_still_resolves_from_network() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(COVER, png_bytes(5, 5, [4, 4, 4, 255]));
    let cache = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());
    let path = cache.cache_path(COVER);
    fs::create_dir_all(path.join("occupied")).unwrap();

    let cover = cache.resolve(COVER, ImageSize::square(6));

    assert_eq!(cover.source, CoverSource::Network);
    assert_eq!(cover.bitmap.dimensions(), (6, 6));
    assert!(path.as_std_path().is_dir());
}

#[test]
fn size_change_refetches_cached_cover() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(COVER, png_bytes(30, 30, [10, 20, 30, 255]));
    ImageCache::new(cache_dir(&dir), http.clone(), no_delay()).resolve(COVER, ImageSize::square(12));

    let resized = ImageCache::new(cache_dir(&dir), http.clone(), no_delay());
    let cover = resized.resolve(COVER, ImageSize::square(24));

    assert_eq!(cover.source, CoverSource::Network);
    assert_eq!(http.calls(), 2);
    let rewritten = image::open(resized.cache_path(COVER).as_std_path()).unwrap();
    assert_eq!(rewritten.width(), 24);
}

#[test]
fn size_change_offline_resizes_cached_copy() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(COVER, png_bytes(30, 30, [10, 20, 30, 255]));
    ImageCache::new(cache_dir(&dir), http, no_delay()).resolve(COVER, ImageSize::square(12));

    let offline = MockHttp::new();
    let cache = ImageCache::new(cache_dir(&dir), offline.clone(), no_delay());
    let cover = cache.resolve(COVER, ImageSize::square(24));

    assert_eq!(cover.source, CoverSource::Disk);
    assert_eq!(cover.bitmap.dimensions(), (24, 24));
    assert_eq!(offline.calls(), 3);
}
