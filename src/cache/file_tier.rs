//! Durable file-backed cache tier.
//!
//! One directory, one file per entry, flat layout:
//!
//! ```text
//! {dir}/.nomedia          marker that keeps media indexers out
//! {dir}/{name}            committed entry
//! {dir}/.tmp-{pid}-{n}    staging file (hidden, never counted)
//! ```
//!
//! # First Writer Wins
//!
//! Entries are staged in a hidden temp file and published with a hard link
//! to the final name. Linking fails if the name already exists, so two
//! concurrent writers of the same entry cannot overwrite each other: the
//! loser sees `AlreadyExists`, reports "not inserted" and discards its
//! staging file. Readers never see a partially written entry.
//!
//! # Eviction
//!
//! The tier does not evict on its own. [`FileTier::prune`] deletes the
//! oldest files (by modification time) until the tier fits a byte budget.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::StorageError;

/// Marker file suppressing external media indexing.
pub const NO_MEDIA_MARKER: &str = ".nomedia";

/// Monotonic suffix for staging file names within this process.
static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Entry count and total size of a tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierUsage {
    pub files: usize,
    pub bytes: u64,
}

/// Outcome of a prune or clear pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneResult {
    pub entries_removed: usize,
    pub bytes_freed: u64,
    pub duration_ms: u64,
}

/// A directory of cache entries addressed by file name.
#[derive(Debug, Clone)]
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    /// Open (creating if needed) a tier directory and its marker file.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let marker = dir.join(NO_MEDIA_MARKER);
        if !tokio::fs::try_exists(&marker).await.unwrap_or(false) {
            tokio::fs::write(&marker, b"")
                .await
                .map_err(|e| StorageError::io(&marker, e))?;
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an entry lives at, whether or not it exists.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Whether an entry exists. Errors count as absent.
    pub async fn contains(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path_for(name))
            .await
            .unwrap_or(false)
    }

    /// Read an entry. A missing entry is `Ok(None)`.
    pub async fn read(&self, name: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Write `data` as entry `name`.
    ///
    /// Returns `Ok(false)` if the entry already exists.
    pub async fn insert_bytes(&self, name: &str, data: &[u8]) -> Result<bool, StorageError> {
        if self.contains(name).await {
            return Ok(false);
        }

        let staging = self.staging_path();
        if let Err(e) = tokio::fs::write(&staging, data).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StorageError::io(&staging, e));
        }

        self.publish(&staging, name).await
    }

    /// Copy or move the file at `source` in as entry `name`.
    ///
    /// With `move_source` the source file is consumed whatever the outcome:
    /// it either becomes the entry or is deleted.
    ///
    /// Returns `Ok(false)` if the entry already exists.
    pub async fn insert_file(
        &self,
        name: &str,
        source: &Path,
        move_source: bool,
    ) -> Result<bool, StorageError> {
        if self.contains(name).await {
            if move_source {
                remove_quietly(source).await;
            }
            return Ok(false);
        }

        let staging = self.staging_path();
        let staged = if move_source {
            match tokio::fs::rename(source, &staging).await {
                Ok(()) => Ok(()),
                // Different filesystem: fall back to copy + delete
                Err(_) => {
                    let copied = tokio::fs::copy(source, &staging).await.map(|_| ());
                    remove_quietly(source).await;
                    copied
                }
            }
        } else {
            tokio::fs::copy(source, &staging).await.map(|_| ())
        };

        if let Err(e) = staged {
            remove_quietly(&staging).await;
            return Err(StorageError::io(source, e));
        }

        self.publish(&staging, name).await
    }

    /// Atomically publish a staged file, then remove the staging name.
    async fn publish(&self, staging: &Path, name: &str) -> Result<bool, StorageError> {
        let dest = self.path_for(name);
        let linked = tokio::fs::hard_link(staging, &dest).await;
        remove_quietly(staging).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::io(&dest, e)),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(".tmp-{}-{}", std::process::id(), n))
    }

    /// Count entries and bytes.
    pub async fn usage(&self) -> Result<TierUsage, StorageError> {
        let dir = self.dir.clone();
        let files = run_blocking(move || collect_entries(&dir)).await??;
        Ok(TierUsage {
            files: files.len(),
            bytes: files.iter().map(|(_, _, size)| size).sum(),
        })
    }

    /// Delete the oldest entries until the tier holds at most `max_bytes`.
    pub async fn prune(&self, max_bytes: u64) -> Result<PruneResult, StorageError> {
        let dir = self.dir.clone();
        let result = run_blocking(move || prune_blocking(&dir, max_bytes)).await??;

        if result.entries_removed > 0 {
            debug!(
                dir = %self.dir.display(),
                entries_removed = result.entries_removed,
                bytes_freed = result.bytes_freed,
                duration_ms = result.duration_ms,
                "File tier pruned"
            );
        }
        Ok(result)
    }

    /// Delete every entry. The directory and marker stay.
    pub async fn clear(&self) -> Result<PruneResult, StorageError> {
        self.prune(0).await
    }
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Io {
            path: String::new(),
            message: format!("blocking task failed: {}", e),
        })
}

/// Visible regular files with their mtime and size.
fn collect_entries(dir: &Path) -> Result<Vec<(PathBuf, SystemTime, u64)>, StorageError> {
    let entries = std::fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((entry.path(), mtime, metadata.len()));
    }
    Ok(files)
}

fn prune_blocking(dir: &Path, max_bytes: u64) -> Result<PruneResult, StorageError> {
    let start = Instant::now();

    let mut files = collect_entries(dir)?;
    let mut remaining: u64 = files.iter().map(|(_, _, size)| size).sum();

    // Oldest first
    files.sort_by_key(|(_, mtime, _)| *mtime);

    let mut result = PruneResult::default();
    for (path, _, size) in files {
        if remaining <= max_bytes {
            break;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                remaining = remaining.saturating_sub(size);
                result.bytes_freed += size;
                result.entries_removed += 1;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to delete cache file");
            }
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}

// =============================================================================
// Tests
// =============================================================================
