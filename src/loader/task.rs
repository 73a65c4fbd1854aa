//! Load tasks and their handles.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::LoadError;

use super::request::LoadRequest;

/// Lifecycle of a task.
///
/// ```text
/// Pending ──► Running ──┬──► Delivered
///                       ├──► Cancelled
///                       └──► Superseded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Admitted, waiting for the pipeline
    Pending,
    /// Pipeline running (or joined to a running execution)
    Running,
    /// Result (bitmap or error placeholder) handed to the slot
    Delivered,
    /// Cancelled before delivery
    Cancelled,
    /// Finished, but the slot had moved on or was gone
    Superseded,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Delivered | TaskState::Cancelled | TaskState::Superseded
        )
    }
}

/// One in-flight load for one slot.
pub struct LoadTask {
    id: u64,
    request: Arc<LoadRequest>,
    token: CancellationToken,
    state: watch::Sender<TaskState>,
    failure: OnceLock<LoadError>,
}

impl LoadTask {
    pub(crate) fn new(id: u64, request: Arc<LoadRequest>) -> Arc<Self> {
        let (state, _) = watch::channel(TaskState::Pending);
        Arc::new(Self {
            id,
            request,
            token: CancellationToken::new(),
            state,
            failure: OnceLock::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &Arc<LoadRequest> {
        &self.request
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Request cancellation. Never blocks; the worker observes it at the
    /// next stage boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Move to `next` unless the task already finished.
    pub(crate) fn transition(&self, next: TaskState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    pub(crate) fn record_failure(&self, error: LoadError) {
        let _ = self.failure.set(error);
    }
}

impl fmt::Debug for LoadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadTask")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Caller-side view of a task.
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<LoadTask>,
}

impl TaskHandle {
    pub(crate) fn new(task: Arc<LoadTask>) -> Self {
        Self { task }
    }

    pub fn id(&self) -> u64 {
        self.task.id
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    pub fn request(&self) -> &LoadRequest {
        &self.task.request
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// Why the load produced no bitmap, once it has finished that way.
    pub fn error(&self) -> Option<LoadError> {
        self.task.failure.get().cloned()
    }

    /// Wait for the task to reach a terminal state.
    pub async fn finished(&self) -> TaskState {
        let mut rx = self.task.state.subscribe();
        let state = match rx.wait_for(TaskState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.task.state(),
        };
        state
    }

    pub(crate) fn task(&self) -> &Arc<LoadTask> {
        &self.task
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.task.fmt(f)
    }
}
