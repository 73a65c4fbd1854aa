//! Tiered cache.
//!
//! Three tiers, consulted in this order:
//!
//! ```text
//!   ┌────────────────┐   miss   ┌──────────────────────┐   miss   ┌──────────────────────┐
//!   │  MemoryCache   │ ───────► │  processed FileTier  │ ───────► │  original FileTier   │
//!   │ CacheKey→Bitmap│          │  CacheKey→PNG file   │          │ ContentIdentity→raw  │
//!   └────────────────┘          └──────────────────────┘          └──────────────────────┘
//!     byte-bounded LRU            ready to display                  must still be decoded
//! ```
//!
//! A [`CacheKey`] pairs a [`ContentIdentity`] (which image) with a
//! [`VariantKey`] (which rendering). The original tier only needs the
//! content identity; the other two need the full key.
//!
//! Puts are idempotent in every tier: the first writer wins and later
//! writers get `false`.

mod file_tier;
mod key;
mod memory;
mod tiered;

pub use file_tier::{FileTier, PruneResult, TierUsage, NO_MEDIA_MARKER};
pub use key::{CacheKey, ContentIdentity, VariantKey, KEY_SEPARATOR};
pub use memory::{MemoryCache, DEFAULT_MEMORY_CAPACITY};
pub use tiered::{CacheStats, TieredCache, ORIGINAL_DIR, PROCESSED_DIR};
