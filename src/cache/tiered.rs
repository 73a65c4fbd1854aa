//! Memory + processed-file + original-file cache.
//!
//! Failure semantics: storage errors never reach the caller. A failed put
//! is logged and reported as "not inserted"; a failed get is logged and
//! reported as a miss.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::Serialize;
use tracing::{debug, warn};

use crate::decode::Bitmap;
use crate::error::StorageError;
use crate::source::RawHandle;

use super::file_tier::{FileTier, PruneResult, TierUsage};
use super::key::{CacheKey, ContentIdentity};
use super::memory::MemoryCache;

/// Subdirectory holding raw fetched bytes.
pub const ORIGINAL_DIR: &str = "original";

/// Subdirectory holding encoded processed variants.
pub const PROCESSED_DIR: &str = "processed";

/// Snapshot of cache usage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_bytes: usize,
    pub memory_capacity: usize,
    pub original: Option<TierUsage>,
    pub processed: Option<TierUsage>,
}

/// The three cache tiers behind one facade.
///
/// File tiers are optional: a memory-only cache answers every file lookup
/// with a miss and every file put with `false`.
pub struct TieredCache {
    memory: MemoryCache,
    original: Option<FileTier>,
    processed: Option<FileTier>,
}

impl TieredCache {
    /// Memory tier only.
    pub fn memory_only(memory_budget: usize) -> Self {
        Self {
            memory: MemoryCache::with_capacity(memory_budget),
            original: None,
            processed: None,
        }
    }

    /// All tiers, with the file tiers under `root`.
    pub async fn open(root: impl AsRef<Path>, memory_budget: usize) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let original = FileTier::open(root.join(ORIGINAL_DIR)).await?;
        let processed = FileTier::open(root.join(PROCESSED_DIR)).await?;

        debug!(
            root = %root.display(),
            memory_budget,
            "Opened tiered cache"
        );

        Ok(Self {
            memory: MemoryCache::with_capacity(memory_budget),
            original: Some(original),
            processed: Some(processed),
        })
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn original_tier(&self) -> Option<&FileTier> {
        self.original.as_ref()
    }

    pub fn processed_tier(&self) -> Option<&FileTier> {
        self.processed.as_ref()
    }

    // -------------------------------------------------------------------------
    // Memory tier
    // -------------------------------------------------------------------------

    pub async fn get_memory(&self, key: &CacheKey) -> Option<Bitmap> {
        self.memory.get(key).await
    }

    /// Idempotent: `false` if already present or the bitmap is unusable.
    pub async fn put_memory(&self, key: &CacheKey, bitmap: &Bitmap) -> bool {
        self.memory.put(key.clone(), bitmap.clone()).await
    }

    // -------------------------------------------------------------------------
    // Processed-file tier
    // -------------------------------------------------------------------------

    /// Decode a stored variant. Missing, unreadable and corrupt entries all
    /// count as a miss.
    pub async fn get_processed_file(&self, key: &CacheKey) -> Option<Bitmap> {
        let tier = self.processed.as_ref()?;
        let name = processed_name(key);

        let data = match tier.read(&name).await {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Processed file read failed");
                return None;
            }
        };

        let decoded = tokio::task::spawn_blocking(move || {
            image::load_from_memory_with_format(&data, ImageFormat::Png)
                .map(|image| Bitmap::new(image.into_rgba8()))
        })
        .await;

        match decoded {
            Ok(Ok(bitmap)) if !bitmap.is_empty() => Some(bitmap),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Processed file is corrupt");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Processed file decode task failed");
                None
            }
        }
    }

    /// First writer wins: `false` if the variant is already stored.
    pub async fn put_processed_file(&self, key: &CacheKey, bitmap: &Bitmap) -> bool {
        let Some(tier) = self.processed.as_ref() else {
            return false;
        };
        if bitmap.is_empty() {
            return false;
        }

        let name = processed_name(key);
        if tier.contains(&name).await {
            return false;
        }

        let pixels = bitmap.clone();
        let encoded = tokio::task::spawn_blocking(move || encode_png(&pixels)).await;
        let data = match encoded {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to encode processed file");
                return false;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Processed file encode task failed");
                return false;
            }
        };

        match tier.insert_bytes(&name, &data).await {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to store processed file");
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Original-file tier
    // -------------------------------------------------------------------------

    /// Existence check only; the bytes are not read.
    pub async fn get_original_file(&self, content: &ContentIdentity) -> Option<RawHandle> {
        let tier = self.original.as_ref()?;
        if tier.contains(content.as_str()).await {
            Some(RawHandle::File(tier.path_for(content.as_str())))
        } else {
            None
        }
    }

    /// Store raw bytes for a content identity.
    ///
    /// With `delete_source` a file handle is moved into the tier (or deleted
    /// if the entry already exists) rather than copied.
    pub async fn put_original_file(
        &self,
        content: &ContentIdentity,
        handle: &RawHandle,
        delete_source: bool,
    ) -> bool {
        let Some(tier) = self.original.as_ref() else {
            return false;
        };

        let result = match handle {
            RawHandle::File(path) => tier.insert_file(content.as_str(), path, delete_source).await,
            RawHandle::Bytes(data) => tier.insert_bytes(content.as_str(), data).await,
        };

        match result {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!(content = %content, error = %e, "Failed to store original file");
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.len().await,
            memory_bytes: self.memory.size().await,
            memory_capacity: self.memory.capacity(),
            original: tier_usage(self.original.as_ref()).await,
            processed: tier_usage(self.processed.as_ref()).await,
        }
    }

    /// Trim each file tier to `max_bytes`, oldest files first.
    pub async fn prune_files(&self, max_bytes: u64) -> Result<PruneResult, StorageError> {
        let mut total = PruneResult::default();
        for tier in self.file_tiers() {
            let result = tier.prune(max_bytes).await?;
            total.entries_removed += result.entries_removed;
            total.bytes_freed += result.bytes_freed;
            total.duration_ms += result.duration_ms;
        }
        Ok(total)
    }

    /// Empty every tier.
    pub async fn clear(&self) -> Result<PruneResult, StorageError> {
        self.memory.clear().await;
        self.prune_files(0).await
    }

    fn file_tiers(&self) -> impl Iterator<Item = &FileTier> {
        self.processed.iter().chain(self.original.iter())
    }

    /// Paths of the file tiers, for diagnostics.
    pub fn file_dirs(&self) -> Vec<PathBuf> {
        self.file_tiers().map(|t| t.dir().to_path_buf()).collect()
    }
}

/// File name for a processed variant.
fn processed_name(key: &CacheKey) -> String {
    format!("{}.png", key.digest())
}

fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>, StorageError> {
    let mut buf = Cursor::new(Vec::new());
    bitmap
        .image()
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| StorageError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

async fn tier_usage(tier: Option<&FileTier>) -> Option<TierUsage> {
    match tier?.usage().await {
        Ok(usage) => Some(usage),
        Err(e) => {
            warn!(error = %e, "Failed to read file tier usage");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
