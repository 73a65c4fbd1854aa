//! Test utilities for integration tests.
//!
//! Mock fetch and decode backends that count their calls, a slot that
//! records everything it is shown, and synthetic PNG fixtures.

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use image_loader::error::{DecodeError, FetchError};
use image_loader::source::{FetchBackend, Fetched, RawHandle, SourceBackends};
use image_loader::{
    Bitmap, DecodeBackend, ImageLoader, ImageSource, Placeholder, RasterDecoder, Slot,
    TieredCache,
};

// =============================================================================
// Fixtures
// =============================================================================

pub const RED: [u8; 4] = [220, 20, 20, 255];
pub const GREEN: [u8; 4] = [20, 220, 20, 255];
pub const BLUE: [u8; 4] = [20, 20, 220, 255];

/// Encode a solid-colour PNG.
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Bytes {
    let mut buf = Cursor::new(Vec::new());
    RgbaImage::from_pixel(width, height, Rgba(color))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    Bytes::from(buf.into_inner())
}

// =============================================================================
// Tracking Fetcher
// =============================================================================

/// How a [`TrackingFetcher`] hands out its data.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// In-memory bytes
    Bytes,
    /// A temporary file in the staging directory, delete after use
    TempFile,
}

/// Fetch backend serving registered images by locator, counting fetches.
///
/// Fetches can be held at a gate until [`TrackingFetcher::open`] is called,
/// which makes overlapping loads deterministic.
pub struct TrackingFetcher {
    images: Mutex<HashMap<String, Bytes>>,
    fetch_count: AtomicUsize,
    gate: watch::Sender<bool>,
    kind: HandleKind,
    staging: Option<PathBuf>,
    staged: AtomicUsize,
}

impl TrackingFetcher {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            images: Mutex::new(HashMap::new()),
            fetch_count: AtomicUsize::new(0),
            gate,
            kind: HandleKind::Bytes,
            staging: None,
            staged: AtomicUsize::new(0),
        }
    }

    /// Hold every fetch until [`open`](Self::open).
    pub fn gated() -> Self {
        let fetcher = Self::new();
        fetcher.gate.send_replace(false);
        fetcher
    }

    /// Serve data as temporary files staged in `dir`.
    pub fn staging_files(mut self, dir: impl Into<PathBuf>) -> Self {
        self.kind = HandleKind::TempFile;
        self.staging = Some(dir.into());
        self
    }

    pub fn with_image(self, locator: &str, data: Bytes) -> Self {
        self.images.lock().unwrap().insert(locator.to_string(), data);
        self
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` fetches have started.
    pub async fn wait_for_fetches(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.fetch_count() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("fetch did not start");
    }
}

#[async_trait]
impl FetchBackend for TrackingFetcher {
    async fn fetch(&self, source: &ImageSource) -> Result<Fetched, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let locator = source.locator().into_owned();
        let data = self
            .images
            .lock()
            .unwrap()
            .get(&locator)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(locator.clone()))?;

        match (self.kind, &self.staging) {
            (HandleKind::TempFile, Some(dir)) => {
                let n = self.staged.fetch_add(1, Ordering::SeqCst);
                let path = dir.join(format!("staged-{}.part", n));
                tokio::fs::write(&path, &data)
                    .await
                    .map_err(|e| FetchError::Io(e.to_string()))?;
                Ok(Fetched {
                    handle: RawHandle::File(path),
                    delete_after_use: true,
                })
            }
            _ => Ok(Fetched {
                handle: RawHandle::Bytes(data),
                delete_after_use: false,
            }),
        }
    }
}

// =============================================================================
// Counting Decoder
// =============================================================================

/// [`RasterDecoder`] that counts full decodes.
#[derive(Default)]
pub struct CountingDecoder {
    inner: RasterDecoder,
    decodes: AtomicUsize,
}

impl CountingDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl DecodeBackend for CountingDecoder {
    fn probe_size(&self, data: &[u8]) -> Result<(u32, u32), DecodeError> {
        self.inner.probe_size(data)
    }

    fn decode(&self, data: &[u8], sample: u32) -> Result<RgbaImage, DecodeError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(data, sample)
    }
}

// =============================================================================
// Recording Slot
// =============================================================================

/// Something a slot was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    Image {
        width: u32,
        height: u32,
        color: [u8; 4],
    },
    Placeholder(Placeholder),
}

/// Shared log of slot events, readable after the slot is dropped.
pub type EventLog = Arc<Mutex<Vec<SlotEvent>>>;

pub struct RecordingSlot {
    events: EventLog,
}

impl RecordingSlot {
    /// A new slot and the log it writes to.
    pub fn create() -> (Arc<dyn Slot>, EventLog) {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<dyn Slot> = Arc::new(RecordingSlot {
            events: Arc::clone(&events),
        });
        (slot, events)
    }
}

impl Slot for RecordingSlot {
    fn show_image(&self, bitmap: Bitmap) {
        let color = bitmap.image().get_pixel(0, 0).0;
        self.events.lock().unwrap().push(SlotEvent::Image {
            width: bitmap.width(),
            height: bitmap.height(),
            color,
        });
    }

    fn show_placeholder(&self, placeholder: Placeholder) {
        self.events
            .lock()
            .unwrap()
            .push(SlotEvent::Placeholder(placeholder));
    }
}

/// Images (not placeholders) in a log.
pub fn images(log: &EventLog) -> Vec<SlotEvent> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, SlotEvent::Image { .. }))
        .cloned()
        .collect()
}

/// Placeholders in a log.
pub fn placeholders(log: &EventLog) -> Vec<Placeholder> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SlotEvent::Placeholder(p) => Some(*p),
            SlotEvent::Image { .. } => None,
        })
        .collect()
}

// =============================================================================
// Loader Construction
// =============================================================================

/// A loader wired to mock backends.
pub struct Harness {
    pub loader: ImageLoader,
    pub fetcher: Arc<TrackingFetcher>,
    pub decoder: Arc<CountingDecoder>,
}

impl Harness {
    pub fn new(fetcher: TrackingFetcher, cache: TieredCache) -> Self {
        Self::with_pool(fetcher, cache, 4, 16)
    }

    pub fn memory_only(fetcher: TrackingFetcher) -> Self {
        Self::new(fetcher, TieredCache::memory_only(64 * 1024 * 1024))
    }

    pub fn with_pool(
        fetcher: TrackingFetcher,
        cache: TieredCache,
        workers: usize,
        queue: usize,
    ) -> Self {
        let fetcher = Arc::new(fetcher);
        let decoder = Arc::new(CountingDecoder::new());
        let loader = ImageLoader::builder()
            .cache(Arc::new(cache))
            .backends(SourceBackends::uniform(fetcher.clone()))
            .decoder(decoder.clone())
            .workers(workers)
            .queue_capacity(queue)
            .build()
            .unwrap();
        Self {
            loader,
            fetcher,
            decoder,
        }
    }
}

/// Whether `dir` contains a regular file other than hidden markers.
pub fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.flatten().any(|e| {
                !e.file_name().to_string_lossy().starts_with('.')
                    && e.file_type().map(|t| t.is_file()).unwrap_or(false)
            })
        })
        .unwrap_or(false)
}
