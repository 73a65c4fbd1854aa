//! # Image Loader
//!
//! Loads images into display slots with per-slot request deduplication,
//! cooperative cancellation and a three-tier cache.
//!
//! ## Features
//!
//! - **Slot-aware loading**: a slot only ever shows the result of its most recent request
//! - **Deduplication**: equal requests share one fetch and decode, across slots
//! - **Tiered caching**: memory LRU, processed-variant files and original-source files
//! - **Memory-bounded decode**: subsampled decode followed by an exact scale/crop
//! - **Pluggable backends**: fetch, decode and post-processing behind traits
//!
//! ## Architecture
//!
//! - [`loader`] - Slot table, tasks, worker pool, single-flight and pipeline
//! - [`cache`] - Cache keys, memory tier and file tiers
//! - [`decode`] - Subsampling, decoding and scaling
//! - [`source`] - Image sources and fetch backends
//! - [`config`] - Configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use image_loader::{Bitmap, ImageLoader, ImageSettings, ImageSource, Slot};
//!
//! struct Thumbnail;
//!
//! impl Slot for Thumbnail {
//!     fn show_image(&self, bitmap: Bitmap) {
//!         println!("{}x{}", bitmap.width(), bitmap.height());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let loader = ImageLoader::builder().build().unwrap();
//!     let slot: Arc<dyn Slot> = Arc::new(Thumbnail);
//!     let settings = ImageSettings::new().size(128, 128);
//!
//!     let outcome = loader
//!         .load(&slot, ImageSource::file("photo.jpg"), Some(&settings))
//!         .await;
//!     if let Some(handle) = outcome.handle() {
//!         handle.finished().await;
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod loader;
pub mod source;

// Re-export commonly used types
pub use cache::{CacheKey, CacheStats, ContentIdentity, TieredCache, VariantKey};
pub use config::{parse_size, Cli, Command, LoaderConfig, MemoryBudget};
pub use decode::{Bitmap, DecodeBackend, RasterDecoder, SizeMode};
pub use error::{DecodeError, FetchError, InitError, LoadError, SourceError, StorageError};
pub use loader::{
    CacheFlags, FnProcessor, ImageLoader, ImageLoaderBuilder, ImageProcessor, ImageSettings,
    LoadOutcome, Placeholder, Slot, TaskHandle, TaskState,
};
pub use source::{FetchBackend, ImageSource, ResourceStore, SourceBackends};
