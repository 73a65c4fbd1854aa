//! Slot semantics integration tests.
//!
//! Tests verify:
//! - A slot never shows the result of a request it has moved on from
//! - Equal requests share one fetch and decode, within and across slots
//! - Cancellation, admission limits and placeholders

use std::sync::Arc;
use std::time::Duration;

use image_loader::error::{FetchError, LoadError, SourceError};
use image_loader::loader::LoadRequest;
use image_loader::{
    Bitmap, ImageLoader, ImageSettings, ImageSource, LoadOutcome, Placeholder, TaskState,
};

use super::test_utils::{
    images, placeholders, png_bytes, Harness, RecordingSlot, SlotEvent, TrackingFetcher, BLUE,
    GREEN, RED,
};

fn settings() -> ImageSettings {
    ImageSettings::new().size(50, 50)
}

fn image(color: [u8; 4]) -> SlotEvent {
    SlotEvent::Image {
        width: 50,
        height: 50,
        color,
    }
}

fn two_images() -> TrackingFetcher {
    TrackingFetcher::gated()
        .with_image("/a.png", png_bytes(100, 100, RED))
        .with_image("/b.png", png_bytes(100, 100, GREEN))
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn test_load_delivers_and_memory_hit_skips_fetch() {
    let harness = Harness::memory_only(two_images());
    harness.fetcher.open();
    let (slot, log) = RecordingSlot::create();

    let outcome = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let handle = outcome.handle().unwrap().clone();
    assert_eq!(handle.finished().await, TaskState::Delivered);
    assert!(handle.error().is_none());

    let again = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    assert!(matches!(again, LoadOutcome::MemoryHit));

    assert_eq!(images(&log), vec![image(RED), image(RED)]);
    assert_eq!(placeholders(&log), vec![Placeholder::Loading]);
    assert_eq!(harness.fetcher.fetch_count(), 1);
    assert_eq!(harness.decoder.decode_count(), 1);
    assert!(harness.loader.current_task(&slot).is_none());
}

#[tokio::test]
async fn test_replacement_never_shows_previous_image() {
    let harness = Harness::memory_only(two_images());
    let (slot, log) = RecordingSlot::create();

    let first = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    harness.fetcher.wait_for_fetches(1).await;

    let second = harness
        .loader
        .load(&slot, ImageSource::file("/b.png"), Some(&settings()))
        .await;
    assert!(matches!(second, LoadOutcome::Started(_)));

    harness.fetcher.open();

    let second = second.handle().unwrap();
    assert_eq!(second.finished().await, TaskState::Delivered);
    assert_eq!(
        first.handle().unwrap().finished().await,
        TaskState::Cancelled
    );

    assert_eq!(images(&log), vec![image(GREEN)]);
}

#[tokio::test]
async fn test_memory_hit_cancels_running_task() {
    let harness = Harness::memory_only(two_images());
    let (slot, log) = RecordingSlot::create();

    let cached = LoadRequest::new(ImageSource::file("/b.png"), &settings(), false);
    let bitmap = Bitmap::new(image::RgbaImage::from_pixel(
        50,
        50,
        image::Rgba(BLUE),
    ));
    assert!(harness.loader.cache().put_memory(&cached.key, &bitmap).await);

    let running = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let hit = harness
        .loader
        .load(&slot, ImageSource::file("/b.png"), Some(&settings()))
        .await;
    assert!(matches!(hit, LoadOutcome::MemoryHit));

    harness.fetcher.open();
    assert_eq!(
        running.handle().unwrap().finished().await,
        TaskState::Cancelled
    );
    assert_eq!(images(&log), vec![image(BLUE)]);
}

#[tokio::test]
async fn test_default_settings_apply_without_settings() {
    let fetcher = Arc::new(
        TrackingFetcher::new().with_image("/a.png", png_bytes(100, 100, RED)),
    );
    let loader = ImageLoader::builder()
        .backends(image_loader::SourceBackends::uniform(fetcher.clone()))
        .default_settings(ImageSettings::new().size(20, 20))
        .build()
        .unwrap();
    let (slot, log) = RecordingSlot::create();

    let outcome = loader.load(&slot, ImageSource::file("/a.png"), None).await;
    outcome.handle().unwrap().finished().await;

    assert_eq!(
        images(&log),
        vec![SlotEvent::Image {
            width: 20,
            height: 20,
            color: RED
        }]
    );
}

// =============================================================================
// Deduplication
// =============================================================================

#[tokio::test]
async fn test_duplicate_on_same_slot_is_noop() {
    let harness = Harness::memory_only(two_images());
    let (slot, log) = RecordingSlot::create();

    let first = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let second = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;

    let LoadOutcome::AlreadyLoading(existing) = second else {
        panic!("expected AlreadyLoading, got {:?}", second);
    };
    let first = first.handle().unwrap();
    assert_eq!(existing.id(), first.id());

    harness.fetcher.open();
    assert_eq!(first.finished().await, TaskState::Delivered);

    assert_eq!(harness.fetcher.fetch_count(), 1);
    assert_eq!(harness.decoder.decode_count(), 1);
    assert_eq!(images(&log), vec![image(RED)]);
    assert_eq!(placeholders(&log), vec![Placeholder::Loading]);
}

#[tokio::test]
async fn test_equal_requests_across_slots_share_one_execution() {
    let harness = Harness::memory_only(two_images());
    let (slot_a, log_a) = RecordingSlot::create();
    let (slot_b, log_b) = RecordingSlot::create();

    let a = harness
        .loader
        .load(&slot_a, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let b = harness
        .loader
        .load(&slot_b, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    assert!(matches!(a, LoadOutcome::Started(_)));
    assert!(matches!(b, LoadOutcome::Started(_)));

    harness.fetcher.wait_for_fetches(1).await;
    assert_eq!(harness.loader.in_flight(), 1);
    harness.fetcher.open();

    assert_eq!(a.handle().unwrap().finished().await, TaskState::Delivered);
    assert_eq!(b.handle().unwrap().finished().await, TaskState::Delivered);

    assert_eq!(harness.fetcher.fetch_count(), 1);
    assert_eq!(harness.decoder.decode_count(), 1);
    assert_eq!(images(&log_a), vec![image(RED)]);
    assert_eq!(images(&log_b), vec![image(RED)]);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancelling_one_joined_task_keeps_the_other() {
    let harness = Harness::memory_only(two_images());
    let (slot_a, log_a) = RecordingSlot::create();
    let (slot_b, log_b) = RecordingSlot::create();

    let a = harness
        .loader
        .load(&slot_a, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let b = harness
        .loader
        .load(&slot_b, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    harness.fetcher.wait_for_fetches(1).await;

    assert!(harness.loader.cancel(&slot_a));
    harness.fetcher.open();

    assert_eq!(a.handle().unwrap().finished().await, TaskState::Cancelled);
    assert_eq!(b.handle().unwrap().finished().await, TaskState::Delivered);

    assert!(images(&log_a).is_empty());
    assert_eq!(images(&log_b), vec![image(RED)]);
    assert_eq!(harness.fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_cancelled_execution_is_restarted_by_next_load() {
    let harness = Harness::memory_only(two_images());
    let (slot, log) = RecordingSlot::create();

    let first = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    harness.fetcher.wait_for_fetches(1).await;

    assert!(harness.loader.cancel(&slot));
    let first = first.handle().unwrap();
    assert_eq!(first.finished().await, TaskState::Cancelled);
    assert!(first.error().unwrap().is_cancelled());

    let second = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    assert!(matches!(second, LoadOutcome::Started(_)));
    harness.fetcher.open();

    assert_eq!(
        second.handle().unwrap().finished().await,
        TaskState::Delivered
    );
    assert_eq!(harness.fetcher.fetch_count(), 2);
    assert_eq!(images(&log), vec![image(RED)]);
}

#[tokio::test]
async fn test_task_handle_cancel() {
    let harness = Harness::memory_only(two_images());
    let (slot, log) = RecordingSlot::create();

    let outcome = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let handle = outcome.handle().unwrap();
    handle.cancel();
    harness.fetcher.open();

    assert_eq!(handle.finished().await, TaskState::Cancelled);
    assert!(harness.loader.current_task(&slot).is_none());
    assert!(images(&log).is_empty());
}

#[tokio::test]
async fn test_cancel_idle_slot() {
    let harness = Harness::memory_only(two_images());
    let (slot, _log) = RecordingSlot::create();
    assert!(!harness.loader.cancel(&slot));
}

#[tokio::test]
async fn test_dropped_slot_is_not_delivered() {
    let harness = Harness::memory_only(two_images());
    let (slot, log) = RecordingSlot::create();

    let outcome = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    drop(slot);
    harness.fetcher.open();

    assert_eq!(
        outcome.handle().unwrap().finished().await,
        TaskState::Superseded
    );
    assert!(images(&log).is_empty());
    assert_eq!(harness.loader.prune_slots(), 0);
}

// =============================================================================
// Admission and Workers
// =============================================================================

#[tokio::test]
async fn test_full_pool_rejects() {
    let harness = Harness::with_pool(
        two_images(),
        image_loader::TieredCache::memory_only(1 << 24),
        1,
        0,
    );
    let (slot_a, _log_a) = RecordingSlot::create();
    let (slot_b, log_b) = RecordingSlot::create();

    let a = harness
        .loader
        .load(&slot_a, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let b = harness
        .loader
        .load(&slot_b, ImageSource::file("/b.png"), Some(&settings()))
        .await;
    assert!(matches!(b, LoadOutcome::Rejected));
    assert!(log_b.lock().unwrap().is_empty());

    harness.fetcher.open();
    assert_eq!(a.handle().unwrap().finished().await, TaskState::Delivered);
    tokio::task::yield_now().await;

    let retry = harness
        .loader
        .load(&slot_b, ImageSource::file("/b.png"), Some(&settings()))
        .await;
    assert!(matches!(retry, LoadOutcome::Started(_)));
    retry.handle().unwrap().finished().await;
    assert_eq!(images(&log_b), vec![image(GREEN)]);
}

#[tokio::test]
async fn test_workers_bound_concurrent_executions() {
    let harness = Harness::with_pool(
        two_images(),
        image_loader::TieredCache::memory_only(1 << 24),
        1,
        4,
    );
    let (slot_a, _log_a) = RecordingSlot::create();
    let (slot_b, _log_b) = RecordingSlot::create();

    let a = harness
        .loader
        .load(&slot_a, ImageSource::file("/a.png"), Some(&settings()))
        .await;
    let b = harness
        .loader
        .load(&slot_b, ImageSource::file("/b.png"), Some(&settings()))
        .await;

    harness.fetcher.wait_for_fetches(1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.fetcher.fetch_count(), 1);

    harness.fetcher.open();
    assert_eq!(a.handle().unwrap().finished().await, TaskState::Delivered);
    assert_eq!(b.handle().unwrap().finished().await, TaskState::Delivered);
    assert_eq!(harness.fetcher.fetch_count(), 2);
}

// =============================================================================
// Failures and Placeholders
// =============================================================================

#[tokio::test]
async fn test_fetch_failure_shows_error_placeholder() {
    let harness = Harness::memory_only(two_images());
    harness.fetcher.open();
    let (slot, log) = RecordingSlot::create();

    let outcome = harness
        .loader
        .load(&slot, ImageSource::file("/missing.png"), Some(&settings()))
        .await;
    let handle = outcome.handle().unwrap();
    assert_eq!(handle.finished().await, TaskState::Delivered);

    assert!(matches!(
        handle.error(),
        Some(LoadError::Fetch(FetchError::NotFound(_)))
    ));
    assert!(images(&log).is_empty());
    assert_eq!(
        placeholders(&log),
        vec![Placeholder::Loading, Placeholder::Error]
    );
}

#[tokio::test]
async fn test_corrupt_source_shows_error_placeholder() {
    let fetcher = TrackingFetcher::new()
        .with_image("/broken.png", bytes::Bytes::from_static(b"definitely not a png"));
    let harness = Harness::memory_only(fetcher);
    let (slot, log) = RecordingSlot::create();

    let outcome = harness
        .loader
        .load(&slot, ImageSource::file("/broken.png"), Some(&settings()))
        .await;
    let handle = outcome.handle().unwrap();
    handle.finished().await;

    assert!(matches!(handle.error(), Some(LoadError::Decode(_))));
    assert_eq!(
        placeholders(&log),
        vec![Placeholder::Loading, Placeholder::Error]
    );
}

#[tokio::test]
async fn test_invalid_source_cancels_previous_and_schedules_nothing() {
    let harness = Harness::memory_only(two_images());
    let (slot, log) = RecordingSlot::create();

    let running = harness
        .loader
        .load(&slot, ImageSource::file("/a.png"), Some(&settings()))
        .await;

    let invalid = harness
        .loader
        .load(&slot, ImageSource::file(""), Some(&settings()))
        .await;
    assert!(matches!(invalid, LoadOutcome::Invalid(SourceError::Empty)));

    let bad_url = harness
        .loader
        .load(&slot, ImageSource::url("not a url"), Some(&settings()))
        .await;
    assert!(matches!(
        bad_url,
        LoadOutcome::Invalid(SourceError::InvalidUrl { .. })
    ));

    harness.fetcher.open();
    assert_eq!(
        running.handle().unwrap().finished().await,
        TaskState::Cancelled
    );
    assert!(images(&log).is_empty());
    assert_eq!(
        placeholders(&log),
        vec![
            Placeholder::Loading,
            Placeholder::Error,
            Placeholder::Error
        ]
    );
}
