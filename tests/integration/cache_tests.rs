//! Cache tier integration tests.
//!
//! Tests verify:
//! - Cache keys are deterministic and separate every variant
//! - Memory tier idempotence, LRU eviction and oversize rejection
//! - File tiers: first writer wins, corrupt entries miss, maintenance

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

use image_loader::cache::{CacheKey, ORIGINAL_DIR, PROCESSED_DIR};
use image_loader::loader::LoadRequest;
use image_loader::source::RawHandle;
use image_loader::{Bitmap, ImageSettings, ImageSource, SizeMode, TieredCache};

use super::test_utils::{png_bytes, RED};

fn make_key(path: &str, width: u32, height: u32) -> CacheKey {
    let settings = ImageSettings::new().size(width, height);
    LoadRequest::new(ImageSource::file(path), &settings, false).key
}

fn make_bitmap(width: u32, height: u32, value: u8) -> Bitmap {
    Bitmap::new(RgbaImage::from_pixel(
        width,
        height,
        Rgba([value, value, value, 255]),
    ))
}

// =============================================================================
// Keys
// =============================================================================

#[test]
fn test_keys_are_deterministic() {
    let a = make_key("/img/a.png", 100, 100);
    let b = make_key("/img/a.png", 100, 100);
    assert_eq!(a, b);
    assert_eq!(a.digest(), b.digest());
    assert_eq!(a.to_string(), b.to_string());
}

#[test]
fn test_keys_separate_variants_and_sources() {
    let base = make_key("/img/a.png", 100, 100);

    assert_ne!(base, make_key("/img/a.png", 100, 50));
    assert_ne!(base, make_key("/img/b.png", 100, 100));

    let fit = ImageSettings::new().size(100, 100).size_mode(SizeMode::Fit);
    let fit_key = LoadRequest::new(ImageSource::file("/img/a.png"), &fit, false).key;
    assert_ne!(base, fit_key);
    assert_eq!(base.content(), fit_key.content());

    // Same locator, different source kind
    let as_resource = ImageSource::resource("/img/a.png").identity();
    assert_ne!(*base.content(), as_resource);
}

// =============================================================================
// Memory Tier
// =============================================================================

#[tokio::test]
async fn test_memory_put_is_idempotent() {
    let cache = TieredCache::memory_only(1 << 20);
    let key = make_key("/a.png", 10, 10);

    assert!(cache.put_memory(&key, &make_bitmap(10, 10, 1)).await);
    assert!(!cache.put_memory(&key, &make_bitmap(10, 10, 2)).await);

    let stored = cache.get_memory(&key).await.unwrap();
    assert_eq!(stored.image().get_pixel(0, 0), &Rgba([1, 1, 1, 255]));
    assert_eq!(cache.memory().len().await, 1);
}

#[tokio::test]
async fn test_memory_evicts_least_recently_used() {
    // Room for exactly two 10x10 bitmaps
    let cache = TieredCache::memory_only(2 * 10 * 10 * 4);
    let first = make_key("/1.png", 10, 10);
    let second = make_key("/2.png", 10, 10);
    let third = make_key("/3.png", 10, 10);

    cache.put_memory(&first, &make_bitmap(10, 10, 1)).await;
    cache.put_memory(&second, &make_bitmap(10, 10, 2)).await;

    // Touch the first so the second becomes the eviction victim
    assert!(cache.get_memory(&first).await.is_some());
    assert!(cache.put_memory(&third, &make_bitmap(10, 10, 3)).await);

    assert!(cache.get_memory(&first).await.is_some());
    assert!(cache.get_memory(&second).await.is_none());
    assert!(cache.get_memory(&third).await.is_some());
    assert!(cache.memory().size().await <= cache.memory().capacity());
}

#[tokio::test]
async fn test_memory_rejects_oversized_bitmap() {
    let cache = TieredCache::memory_only(100);
    let key = make_key("/big.png", 10, 10);

    assert!(!cache.put_memory(&key, &make_bitmap(10, 10, 0)).await);
    assert!(cache.get_memory(&key).await.is_none());
}

// =============================================================================
// File Tiers
// =============================================================================

#[tokio::test]
async fn test_processed_file_round_trip_is_lossless() {
    let dir = TempDir::new().unwrap();
    let cache = TieredCache::open(dir.path(), 1 << 20).await.unwrap();
    let key = make_key("/a.png", 8, 8);
    let bitmap = make_bitmap(8, 8, 77);

    assert!(cache.put_processed_file(&key, &bitmap).await);
    assert!(!cache.put_processed_file(&key, &bitmap).await);

    let loaded = cache.get_processed_file(&key).await.unwrap();
    assert_eq!(loaded.image(), bitmap.image());
}

#[tokio::test]
async fn test_corrupt_processed_file_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let cache = TieredCache::open(dir.path(), 1 << 20).await.unwrap();
    let key = make_key("/a.png", 8, 8);

    cache.put_processed_file(&key, &make_bitmap(8, 8, 1)).await;

    let processed = dir.path().join(PROCESSED_DIR);
    for entry in std::fs::read_dir(&processed).unwrap().flatten() {
        if !entry.file_name().to_string_lossy().starts_with('.') {
            std::fs::write(entry.path(), b"garbage").unwrap();
        }
    }

    assert!(cache.get_processed_file(&key).await.is_none());
}

#[tokio::test]
async fn test_original_file_first_writer_wins() {
    let dir = TempDir::new().unwrap();
    let cache = TieredCache::open(dir.path(), 1 << 20).await.unwrap();
    let content = ImageSource::file("/a.png").identity();

    let first = RawHandle::Bytes(png_bytes(4, 4, RED));
    let second = RawHandle::Bytes(png_bytes(8, 8, RED));
    assert!(cache.put_original_file(&content, &first, false).await);
    assert!(!cache.put_original_file(&content, &second, false).await);

    let handle = cache.get_original_file(&content).await.unwrap();
    assert_eq!(handle.read().await.unwrap(), png_bytes(4, 4, RED));
}

#[tokio::test]
async fn test_prune_and_clear() {
    let dir = TempDir::new().unwrap();
    let cache = TieredCache::open(dir.path(), 1 << 20).await.unwrap();

    for i in 0..4 {
        let content = ImageSource::file(format!("/{}.png", i)).identity();
        let handle = RawHandle::Bytes(bytes::Bytes::from(vec![i as u8; 1000]));
        assert!(cache.put_original_file(&content, &handle, false).await);
    }
    cache
        .put_processed_file(&make_key("/0.png", 4, 4), &make_bitmap(4, 4, 9))
        .await;

    let stats = cache.stats().await;
    assert_eq!(stats.original.unwrap().files, 4);
    assert_eq!(stats.original.unwrap().bytes, 4000);
    assert_eq!(stats.processed.unwrap().files, 1);

    let pruned = cache.prune_files(2000).await.unwrap();
    assert_eq!(pruned.entries_removed, 2);
    assert_eq!(pruned.bytes_freed, 2000);
    assert_eq!(cache.stats().await.original.unwrap().files, 2);

    let cleared = cache.clear().await.unwrap();
    assert_eq!(cleared.entries_removed, 3);

    let stats = cache.stats().await;
    assert_eq!(stats.original.unwrap().files, 0);
    assert_eq!(stats.processed.unwrap().files, 0);
    assert_eq!(stats.memory_entries, 0);

    // The tier directories and their markers survive
    assert!(dir
        .path()
        .join(ORIGINAL_DIR)
        .join(image_loader::cache::NO_MEDIA_MARKER)
        .exists());
}

#[tokio::test]
async fn test_unwritable_tiers_report_not_inserted() {
    let dir = TempDir::new().unwrap();
    let cache = TieredCache::open(dir.path(), 1 << 20).await.unwrap();
    for tier in [PROCESSED_DIR, ORIGINAL_DIR] {
        let path = dir.path().join(tier);
        std::fs::remove_dir_all(&path).unwrap();
        std::fs::write(&path, b"not a directory").unwrap();
    }

    let key = make_key("/a.png", 4, 4);
    assert!(!cache.put_processed_file(&key, &make_bitmap(4, 4, 1)).await);
    assert!(cache.get_processed_file(&key).await.is_none());

    let handle = RawHandle::Bytes(png_bytes(4, 4, RED));
    assert!(!cache.put_original_file(key.content(), &handle, false).await);
    assert!(cache.get_original_file(key.content()).await.is_none());

    // The memory tier is unaffected
    assert!(cache.put_memory(&key, &make_bitmap(4, 4, 1)).await);
}

#[tokio::test]
async fn test_memory_only_cache_has_no_file_tiers() {
    let cache = TieredCache::memory_only(1 << 20);
    let key = make_key("/a.png", 4, 4);

    assert!(!cache.put_processed_file(&key, &make_bitmap(4, 4, 1)).await);
    assert!(cache.get_processed_file(&key).await.is_none());
    assert!(cache.file_dirs().is_empty());

    let stats = cache.stats().await;
    assert!(stats.original.is_none());
    assert!(stats.processed.is_none());
}
