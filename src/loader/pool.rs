use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Default number of concurrent pipeline executions.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of admitted tasks that may wait for a worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Bounded worker pool.
///
/// Two semaphores: `admission` bounds everything in the pool (running plus
/// queued) and is tried without waiting, so a full pool rejects instead of
/// blocking the caller; `workers` bounds what actually runs.
#[derive(Clone)]
pub struct WorkerPool {
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    worker_count: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        Self {
            admission: Arc::new(Semaphore::new(worker_count + queue_capacity)),
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            queue_capacity,
        }
    }

    /// Reserve a place in the pool, or `None` if it is full.
    pub fn try_admit(&self) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(&self.admission).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => None,
        }
    }

    /// Wait for a free worker.
    pub async fn acquire_worker(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.workers).acquire_owned().await.ok()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Admission places currently free.
    pub fn available(&self) -> usize {
        self.admission.available_permits()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_CAPACITY)
    }
}
