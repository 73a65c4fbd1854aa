//! Display slots and the slot → task table.
//!
//! The loader never owns a slot. It keeps a [`Weak`] reference per slot and
//! checks liveness right before delivery, so a slot dropped by its owner is
//! simply skipped.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::decode::Bitmap;

use super::request::LoadRequest;
use super::task::LoadTask;

/// What a slot should show while it has no image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// A load has started
    Loading,
    /// The load failed or the source was invalid
    Error,
}

/// A display target that shows at most one image at a time.
///
/// Callbacks run on loader worker tasks and must not block.
///
/// Ownership is decided under the slot table's lock, but callbacks run after
/// it is released so they may call back into the loader. A `load` issued on
/// another thread in that gap may have the older image or placeholder
/// arrive after it has already started, and even after a memory-cache hit
/// it delivered synchronously. The window is one callback wide; the next
/// delivery for the slot replaces the stale frame.
pub trait Slot: Send + Sync {
    fn show_image(&self, bitmap: Bitmap);

    fn show_placeholder(&self, _placeholder: Placeholder) {}
}

/// Identity of a slot: the address of its allocation.
///
/// Stable for as long as any `Arc` or `Weak` to the slot exists, which the
/// table guarantees by holding a `Weak` in every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn of(slot: &Arc<dyn Slot>) -> Self {
        SlotId(Arc::as_ptr(slot) as *const () as usize)
    }
}

struct SlotEntry {
    slot: Weak<dyn Slot>,
    /// Generation of the most recent `load` for this slot
    latest: u64,
    current: Option<Arc<LoadTask>>,
}

/// Outcome of [`SlotTable::begin`].
pub(crate) enum Begin {
    /// An equal request is already running for this slot
    Duplicate(Arc<LoadTask>),
    /// The slot now belongs to the new generation
    Claimed { previous: Option<Arc<LoadTask>> },
}

/// Concurrent map from slot identity to its current task.
#[derive(Default)]
pub struct SlotTable {
    entries: DashMap<SlotId, SlotEntry>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a `load` at `generation`.
    ///
    /// If `request` matches the slot's live current task the slot is left
    /// untouched. Otherwise the slot is claimed for `generation` and the
    /// previous current task (which the caller must cancel) is returned.
    pub(crate) fn begin(
        &self,
        slot: &Arc<dyn Slot>,
        generation: u64,
        request: Option<&LoadRequest>,
    ) -> Begin {
        let mut entry = self
            .entries
            .entry(SlotId::of(slot))
            .or_insert_with(|| SlotEntry {
                slot: Arc::downgrade(slot),
                latest: 0,
                current: None,
            });

        if let (Some(request), Some(current)) = (request, entry.current.as_ref()) {
            if !current.is_cancelled() && current.request().as_ref() == request {
                return Begin::Duplicate(Arc::clone(current));
            }
        }

        if generation > entry.latest {
            entry.latest = generation;
        }
        Begin::Claimed {
            previous: entry.current.take(),
        }
    }

    /// Whether `generation` is still the slot's most recent `load`.
    pub(crate) fn is_latest(&self, slot: &Arc<dyn Slot>, generation: u64) -> bool {
        self.entries
            .get(&SlotId::of(slot))
            .map(|entry| entry.latest == generation)
            .unwrap_or(false)
    }

    /// Make `task` the slot's current task if `generation` still owns it.
    pub(crate) fn attach(&self, slot: &Arc<dyn Slot>, generation: u64, task: Arc<LoadTask>) -> bool {
        match self.entries.get_mut(&SlotId::of(slot)) {
            Some(mut entry) if entry.latest == generation => {
                entry.current = Some(task);
                true
            }
            _ => false,
        }
    }

    /// Settle a finished task.
    ///
    /// Returns the live slot if `task` was still current (clearing the
    /// pointer), `None` if it was superseded or the slot is gone.
    pub(crate) fn finish(&self, id: SlotId, task: &Arc<LoadTask>) -> Option<Arc<dyn Slot>> {
        let mut entry = self.entries.get_mut(&id)?;

        let is_current = entry
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, task));
        if !is_current {
            return None;
        }
        entry.current = None;

        match entry.slot.upgrade() {
            Some(slot) => Some(slot),
            None => {
                drop(entry);
                self.entries.remove(&id);
                None
            }
        }
    }

    /// Detach and return the slot's current task, invalidating any `load`
    /// still in progress for it.
    pub(crate) fn take(&self, slot: &Arc<dyn Slot>, generation: u64) -> Option<Arc<LoadTask>> {
        let mut entry = self.entries.get_mut(&SlotId::of(slot))?;
        if generation > entry.latest {
            entry.latest = generation;
        }
        entry.current.take()
    }

    /// The slot's current task, if any.
    pub fn current(&self, slot: &Arc<dyn Slot>) -> Option<Arc<LoadTask>> {
        self.entries
            .get(&SlotId::of(slot))
            .and_then(|entry| entry.current.clone())
    }

    /// Drop entries for slots that no longer exist and have nothing running.
    pub fn prune(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.slot.strong_count() > 0 || entry.current.is_some());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
