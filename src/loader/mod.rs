//! Slot-aware load orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ImageLoader                             │
//! │  SlotTable: slot ──► current LoadTask   (cancel on replace)      │
//! │  WorkerPool: bounded admission + bounded workers                 │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ one task per accepted load
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                FlightTable (cache key + flags)                   │
//! │  equal work across slots shares one execution                    │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ leader only
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Pipeline                               │
//! │  memory ─► processed file ─► original file / fetch ─► decode     │
//! │  ─► processor ─► store                                           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A task only delivers to its slot if it is still the slot's current task
//! when it finishes, so a slot never shows the result of a request it has
//! moved on from.

mod coordinator;
mod flight;
mod pipeline;
mod pool;
mod processor;
mod request;
mod settings;
mod slot;
mod task;

pub use coordinator::{ImageLoader, ImageLoaderBuilder, LoadOutcome, STAGING_DIR};
pub use flight::{FlightCompletion, FlightTable, FlightTicket};
pub use pipeline::{Loaded, Pipeline, Tier};
pub use pool::{WorkerPool, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
pub use processor::{FnProcessor, ImageProcessor};
pub use request::LoadRequest;
pub use settings::{CacheFlags, ImageSettings};
pub use slot::{Placeholder, Slot, SlotId, SlotTable};
pub use task::{LoadTask, TaskHandle, TaskState};
