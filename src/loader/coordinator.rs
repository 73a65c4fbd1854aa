//! The loader front door.
//!
//! [`ImageLoader::load`] is called from the caller's context and never
//! blocks on I/O. It settles everything that can be settled immediately
//! (validation, duplicate detection, memory hits, admission) and hands the
//! rest to a spawned task:
//!
//! ```text
//! load(slot, source, settings)
//!   ├─ invalid source ──────────────► Error placeholder, Invalid
//!   ├─ equal request already running ► AlreadyLoading
//!   ├─ cancel slot's previous task
//!   ├─ memory hit ──────────────────► show bitmap, MemoryHit
//!   ├─ pool full ───────────────────► Rejected
//!   └─ spawn task ──► join flight ──► settle ──► slot (if still current)
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, TieredCache, DEFAULT_MEMORY_CAPACITY};
use crate::config::LoaderConfig;
use crate::decode::{DecodeBackend, RasterDecoder, ScaledDecoder};
use crate::error::{InitError, LoadError, SourceError};
use crate::source::{
    FileFetcher, HttpFetcher, ImageSource, ResourceStore, SourceBackends,
    DEFAULT_HTTP_TIMEOUT_SECS,
};

use super::flight::FlightTable;
use super::pipeline::{Loaded, Pipeline};
use super::pool::{WorkerPool, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use super::request::LoadRequest;
use super::settings::{CacheFlags, ImageSettings};
use super::slot::{Begin, Placeholder, Slot, SlotId, SlotTable};
use super::task::{LoadTask, TaskHandle, TaskState};

/// Name of the download staging directory under the cache root.
pub const STAGING_DIR: &str = "tmp";

type FlightKey = (CacheKey, CacheFlags);
type FlightResult = Result<Loaded, LoadError>;

/// What [`ImageLoader::load`] did with a request.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Delivered synchronously from the memory tier
    MemoryHit,
    /// A new task was scheduled
    Started(TaskHandle),
    /// An equal request is already running for this slot
    AlreadyLoading(TaskHandle),
    /// The worker pool is full; nothing was scheduled
    Rejected,
    /// The source failed validation; the slot shows the error placeholder
    Invalid(SourceError),
    /// A newer `load` or `cancel` for the slot overtook this one
    Superseded,
}

impl LoadOutcome {
    /// The scheduled (or already running) task, if any.
    pub fn handle(&self) -> Option<&TaskHandle> {
        match self {
            LoadOutcome::Started(handle) | LoadOutcome::AlreadyLoading(handle) => Some(handle),
            _ => None,
        }
    }
}

struct Inner {
    pipeline: Pipeline,
    backends: SourceBackends,
    slots: SlotTable,
    flights: Arc<FlightTable<FlightKey, FlightResult>>,
    pool: WorkerPool,
    defaults: ImageSettings,
    logging: bool,
    generation: AtomicU64,
}

/// Slot-aware image loader.
///
/// Cheap to clone; clones share caches, slots and workers.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<Inner>,
}

impl ImageLoader {
    pub fn builder() -> ImageLoaderBuilder {
        ImageLoaderBuilder::new()
    }

    /// Build a loader from validated configuration.
    pub async fn from_config(config: &LoaderConfig) -> Result<Self, InitError> {
        config.validate().map_err(InitError::Config)?;

        let budget = config.memory_budget.resolve();
        let (cache, staging_dir) = match &config.cache_dir {
            Some(dir) => (
                TieredCache::open(dir, budget).await?,
                dir.join(STAGING_DIR),
            ),
            None => (
                TieredCache::memory_only(budget),
                std::env::temp_dir().join("image-loader"),
            ),
        };

        info!(
            memory_budget = budget,
            cache_dir = ?config.cache_dir,
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Image loader configured"
        );

        ImageLoaderBuilder::new()
            .cache(Arc::new(cache))
            .staging_dir(staging_dir)
            .http_timeout_secs(config.http_timeout_secs)
            .workers(config.workers)
            .queue_capacity(config.queue_capacity)
            .logging(config.logging)
            .build()
    }

    /// Load `source` into `slot`.
    ///
    /// `settings` of `None` uses the loader's default settings.
    pub async fn load(
        &self,
        slot: &Arc<dyn Slot>,
        source: ImageSource,
        settings: Option<&ImageSettings>,
    ) -> LoadOutcome {
        let inner = &self.inner;
        let generation = self.next_generation();
        let settings = settings.unwrap_or(&inner.defaults);

        if let Err(e) = inner.backends.validate(&source) {
            if let Begin::Claimed {
                previous: Some(previous),
            } = inner.slots.begin(slot, generation, None)
            {
                previous.cancel();
            }
            warn!(source = %source, error = %e, "Invalid image source");
            if inner.slots.is_latest(slot, generation) {
                slot.show_placeholder(Placeholder::Error);
            }
            return LoadOutcome::Invalid(e);
        }

        let request = Arc::new(LoadRequest::new(source, settings, inner.logging));

        match inner.slots.begin(slot, generation, Some(&request)) {
            Begin::Duplicate(task) => {
                if request.logging {
                    debug!(key = %request.key, task = task.id(), "Request already loading");
                }
                return LoadOutcome::AlreadyLoading(TaskHandle::new(task));
            }
            Begin::Claimed { previous } => {
                if let Some(previous) = previous {
                    if request.logging {
                        debug!(task = previous.id(), "Cancelling previous task");
                    }
                    previous.cancel();
                }
            }
        }

        if request.flags.use_memory {
            if let Some(bitmap) = inner.pipeline.cache().get_memory(&request.key).await {
                if !inner.slots.is_latest(slot, generation) {
                    return LoadOutcome::Superseded;
                }
                if request.logging {
                    debug!(key = %request.key, "Memory cache hit");
                }
                slot.show_image(bitmap);
                return LoadOutcome::MemoryHit;
            }
        }

        let Some(admission) = inner.pool.try_admit() else {
            warn!(
                source = %request.source,
                workers = inner.pool.worker_count(),
                queue_capacity = inner.pool.queue_capacity(),
                "Worker pool full, request rejected"
            );
            return LoadOutcome::Rejected;
        };

        let task = LoadTask::new(generation, Arc::clone(&request));
        if !inner.slots.attach(slot, generation, Arc::clone(&task)) {
            return LoadOutcome::Superseded;
        }

        slot.show_placeholder(Placeholder::Loading);

        if request.logging {
            debug!(task = task.id(), key = %request.key, "Task scheduled");
        }

        let loader = self.clone();
        let slot_id = SlotId::of(slot);
        let handle = TaskHandle::new(Arc::clone(&task));
        tokio::spawn(async move {
            let _admission = admission;
            loader.run_task(slot_id, task).await;
        });

        LoadOutcome::Started(handle)
    }

    /// Cancel whatever the slot is loading.
    ///
    /// Returns `true` if a task was cancelled. Any `load` for the slot still
    /// in progress is superseded.
    pub fn cancel(&self, slot: &Arc<dyn Slot>) -> bool {
        let generation = self.next_generation();
        match self.inner.slots.take(slot, generation) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// The slot's current task.
    pub fn current_task(&self, slot: &Arc<dyn Slot>) -> Option<TaskHandle> {
        self.inner.slots.current(slot).map(TaskHandle::new)
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        self.inner.pipeline.cache()
    }

    pub fn default_settings(&self) -> &ImageSettings {
        &self.inner.defaults
    }

    /// Pipeline executions currently in progress.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.len()
    }

    /// Forget slots that have been dropped.
    pub fn prune_slots(&self) -> usize {
        self.inner.slots.prune()
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn run_task(&self, slot: SlotId, task: Arc<LoadTask>) {
        let result = tokio::select! {
            biased;
            _ = task.token().cancelled() => Err(LoadError::Cancelled),
            result = self.join_flight(&task) => result,
        };
        self.settle(slot, &task, result);
    }

    /// Share an execution with every task doing the same work.
    async fn join_flight(&self, task: &Arc<LoadTask>) -> FlightResult {
        let request = Arc::clone(task.request());
        let ticket = self
            .inner
            .flights
            .join((request.key.clone(), request.flags));

        if ticket.is_leader() {
            let completion = ticket.completion();
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let token = completion.token().clone();
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(LoadError::Cancelled),
                    permit = inner.pool.acquire_worker() => match permit {
                        Some(permit) => {
                            let result = inner.pipeline.execute(&request, &token).await;
                            drop(permit);
                            result
                        }
                        None => Err(LoadError::Rejected),
                    },
                };
                completion.complete(result);
            });
        } else if request.logging {
            debug!(task = task.id(), key = %request.key, "Joined running execution");
        }

        task.transition(TaskState::Running);
        ticket.wait().await.unwrap_or(Err(LoadError::Cancelled))
    }

    fn settle(&self, slot: SlotId, task: &Arc<LoadTask>, result: FlightResult) {
        let slots = &self.inner.slots;

        if task.is_cancelled() {
            slots.finish(slot, task);
            task.record_failure(LoadError::Cancelled);
            task.transition(TaskState::Cancelled);
            if task.request().logging {
                debug!(task = task.id(), "Task cancelled");
            }
            return;
        }

        let Some(target) = slots.finish(slot, task) else {
            if let Err(e) = result {
                task.record_failure(e);
            }
            task.transition(TaskState::Superseded);
            return;
        };

        match result {
            Ok(loaded) => {
                if task.request().logging {
                    debug!(task = task.id(), tier = ?loaded.tier, "Delivering bitmap");
                }
                target.show_image(loaded.bitmap);
            }
            Err(e) => {
                warn!(source = %task.request().source, error = %e, "Image load failed");
                task.record_failure(e);
                target.show_placeholder(Placeholder::Error);
            }
        }
        task.transition(TaskState::Delivered);
    }
}

/// Builder for [`ImageLoader`].
pub struct ImageLoaderBuilder {
    cache: Option<Arc<TieredCache>>,
    backends: Option<SourceBackends>,
    resources: Option<Arc<ResourceStore>>,
    decoder: Option<Arc<dyn DecodeBackend>>,
    defaults: ImageSettings,
    workers: usize,
    queue_capacity: usize,
    logging: bool,
    staging_dir: Option<PathBuf>,
    http_timeout_secs: u64,
}

impl ImageLoaderBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            backends: None,
            resources: None,
            decoder: None,
            defaults: ImageSettings::default(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            logging: false,
            staging_dir: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    /// Shared tiered cache. Defaults to a memory-only cache.
    pub fn cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch backends. Defaults to file, HTTP and an empty resource store.
    pub fn backends(mut self, backends: SourceBackends) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Resource store used by the default backends.
    pub fn resources(mut self, store: Arc<ResourceStore>) -> Self {
        self.resources = Some(store);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn DecodeBackend>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn default_settings(mut self, settings: ImageSettings) -> Self {
        self.defaults = settings;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Default for per-request debug logging.
    pub fn logging(mut self, on: bool) -> Self {
        self.logging = on;
        self
    }

    /// Where HTTP downloads are staged.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<ImageLoader, InitError> {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(TieredCache::memory_only(DEFAULT_MEMORY_CAPACITY)));

        let backends = match self.backends {
            Some(backends) => backends,
            None => {
                let staging_dir = self
                    .staging_dir
                    .unwrap_or_else(|| std::env::temp_dir().join("image-loader"));
                let resources = self.resources.unwrap_or_default();
                SourceBackends::new(
                    Arc::new(FileFetcher::new()),
                    Arc::new(HttpFetcher::new(staging_dir, self.http_timeout_secs)?),
                    resources,
                )
            }
        };

        let decoder: Arc<dyn DecodeBackend> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(RasterDecoder::new()),
        };

        let pipeline = Pipeline::new(cache, backends.clone(), ScaledDecoder::new(decoder));

        Ok(ImageLoader {
            inner: Arc::new(Inner {
                pipeline,
                backends,
                slots: SlotTable::new(),
                flights: FlightTable::new(),
                pool: WorkerPool::new(self.workers, self.queue_capacity),
                defaults: self.defaults,
                logging: self.logging,
                generation: AtomicU64::new(0),
            }),
        })
    }
}

impl Default for ImageLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
