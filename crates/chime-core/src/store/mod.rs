// ── Alarm store ──
//
// In-memory state of the engine: resources, events and the
// earliest-trigger cache, mutated only by the engine task.

mod alarm_store;
mod earliest;
mod event_index;
mod refresh;
mod resource_handle;

pub use alarm_store::AlarmStore;
pub use earliest::{EarliestTriggerCache, affects_earliest};
pub use event_index::EventIndex;
pub use resource_handle::ResourceHandle;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared read access. A poisoned lock still holds consistent state: the
/// engine never panics mid-message while holding it.
pub(crate) fn read(store: &RwLock<AlarmStore>) -> RwLockReadGuard<'_, AlarmStore> {
    store.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write(store: &RwLock<AlarmStore>) -> RwLockWriteGuard<'_, AlarmStore> {
    store.write().unwrap_or_else(PoisonError::into_inner)
}
