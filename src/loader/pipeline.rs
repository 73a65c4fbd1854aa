//! Pipeline orchestration.
//!
//! One execution of a [`LoadRequest`]:
//!
//! 1. Memory tier
//! 2. Processed-file tier (final bitmap, cached back into memory)
//! 3. Original-file tier, else fetch (and persist the raw bytes)
//! 4. Decode + scale
//! 5. Optional processor
//! 6. Store into the enabled tiers
//!
//! The first hit short-circuits everything below it. Cancellation is
//! checked between stages; once a final bitmap exists it is always stored,
//! so a cancelled request still warms the cache for the next one.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::TieredCache;
use crate::decode::{Bitmap, ScaledDecoder};
use crate::error::{DecodeError, LoadError};
use crate::source::SourceBackends;

use super::request::LoadRequest;

/// Where a bitmap came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Memory,
    ProcessedFile,
    OriginalFile,
    Source,
}

/// A finished bitmap and its origin.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub bitmap: Bitmap,
    pub tier: Tier,
}

/// Stateless executor of load requests over shared collaborators.
#[derive(Clone)]
pub struct Pipeline {
    cache: Arc<TieredCache>,
    backends: SourceBackends,
    decoder: ScaledDecoder,
}

impl Pipeline {
    pub fn new(cache: Arc<TieredCache>, backends: SourceBackends, decoder: ScaledDecoder) -> Self {
        Self {
            cache,
            backends,
            decoder,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Run `request` to completion or until `token` is observed cancelled.
    pub async fn execute(
        &self,
        request: &LoadRequest,
        token: &CancellationToken,
    ) -> Result<Loaded, LoadError> {
        let key = &request.key;
        let flags = request.flags;

        if flags.use_memory {
            if let Some(bitmap) = self.cache.get_memory(key).await {
                if request.logging {
                    debug!(key = %key, "Memory cache hit");
                }
                return Ok(Loaded {
                    bitmap,
                    tier: Tier::Memory,
                });
            }
        }

        checkpoint(token)?;

        if flags.use_file_processed {
            if let Some(bitmap) = self.cache.get_processed_file(key).await {
                if request.logging {
                    debug!(key = %key, "Processed file cache hit");
                }
                if flags.use_memory {
                    self.cache.put_memory(key, &bitmap).await;
                }
                return Ok(Loaded {
                    bitmap,
                    tier: Tier::ProcessedFile,
                });
            }
        }

        checkpoint(token)?;

        let (data, tier) = self.raw_bytes(request, token).await?;

        checkpoint(token)?;

        let decoder = self.decoder.clone();
        let variant = key.variant().clone();
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&data, &variant))
            .await
            .map_err(|e| DecodeError::Corrupt(format!("decode task failed: {}", e)))??;

        let bitmap = match &request.processor {
            Some(processor) => {
                checkpoint(token)?;
                let processor = Arc::clone(processor);
                let processed = tokio::task::spawn_blocking(move || {
                    Bitmap::new(processor.process(decoded.into_image()))
                })
                .await
                .map_err(|e| DecodeError::Corrupt(format!("process task failed: {}", e)))?;
                if processed.is_empty() {
                    return Err(DecodeError::EmptyImage.into());
                }
                processed
            }
            None => decoded,
        };

        if flags.use_file_processed {
            self.cache.put_processed_file(key, &bitmap).await;
        }
        if flags.use_memory {
            self.cache.put_memory(key, &bitmap).await;
        }

        if request.logging {
            debug!(
                key = %key,
                tier = ?tier,
                width = bitmap.width(),
                height = bitmap.height(),
                "Decoded and stored bitmap"
            );
        }

        Ok(Loaded { bitmap, tier })
    }

    /// Raw bytes from the original-file tier, or fetched from the source.
    async fn raw_bytes(
        &self,
        request: &LoadRequest,
        token: &CancellationToken,
    ) -> Result<(Bytes, Tier), LoadError> {
        let content = request.key.content();
        let use_original = request.flags.use_file_original && request.source.caches_original();

        if use_original {
            if let Some(handle) = self.cache.get_original_file(content).await {
                match handle.read().await {
                    Ok(data) => {
                        if request.logging {
                            debug!(content = %content, "Original file cache hit");
                        }
                        return Ok((data, Tier::OriginalFile));
                    }
                    Err(e) => {
                        warn!(content = %content, error = %e, "Original file unreadable");
                    }
                }
            }
        }

        checkpoint(token)?;

        if request.logging {
            debug!(source = %request.source, "Fetching source");
        }
        let fetched = self.backends.fetch(&request.source).await?;

        let data = fetched.handle.read().await;

        if use_original && data.is_ok() {
            self.cache
                .put_original_file(content, &fetched.handle, fetched.delete_after_use)
                .await;
        }

        // Temp files not moved into the original tier are ours to delete
        if fetched.delete_after_use {
            if let Some(path) = fetched.handle.path() {
                let _ = tokio::fs::remove_file(path).await;
            }
        }

        Ok((data?, Tier::Source))
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), LoadError> {
    if token.is_cancelled() {
        Err(LoadError::Cancelled)
    } else {
        Ok(())
    }
}
