// ── Event index ──
//
// Primary storage keyed by (resource, event) with a secondary
// event-id -> resources index. Per-resource maps keep insertion order so
// scans are deterministic within a run.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use crate::error::CoreError;
use crate::model::{CategorySet, EventId, EventRecord, ResourceId};

#[derive(Debug, Default)]
pub struct EventIndex {
    /// Primary storage: resource -> event id -> record.
    by_resource: HashMap<ResourceId, IndexMap<EventId, EventRecord>>,

    /// Secondary index: event id -> every resource holding that id.
    by_id: HashMap<EventId, IndexSet<ResourceId>>,
}

impl EventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Never overwrites an existing entry.
    pub fn insert(&mut self, resource: &ResourceId, mut record: EventRecord) -> Result<(), CoreError> {
        let events = self.by_resource.entry(resource.clone()).or_default();
        if events.contains_key(&record.id) {
            return Err(CoreError::DuplicateId {
                resource: resource.clone(),
                id: record.id,
            });
        }
        record.resource_id = resource.clone();
        self.by_id
            .entry(record.id.clone())
            .or_default()
            .insert(resource.clone());
        events.insert(record.id.clone(), record);
        Ok(())
    }

    /// Replace an existing record, returning the previous version.
    ///
    /// The transient `pending` flag is carried over from the old record.
    pub fn update(&mut self, record: EventRecord) -> Result<EventRecord, CoreError> {
        let slot = self
            .by_resource
            .get_mut(&record.resource_id)
            .and_then(|events| events.get_mut(&record.id))
            .ok_or_else(|| CoreError::EventNotFound {
                resource: record.resource_id.clone(),
                id: record.id.clone(),
            })?;
        let pending = slot.pending;
        let old = std::mem::replace(slot, record);
        slot.pending = pending;
        Ok(old)
    }

    pub fn remove(&mut self, resource: &ResourceId, id: &EventId) -> Option<EventRecord> {
        let events = self.by_resource.get_mut(resource)?;
        let removed = events.shift_remove(id)?;
        if events.is_empty() {
            self.by_resource.remove(resource);
        }
        self.unlink(resource, id);
        Some(removed)
    }

    pub fn lookup(&self, resource: &ResourceId, id: &EventId) -> Option<&EventRecord> {
        self.by_resource.get(resource)?.get(id)
    }

    /// Every record with this id, whichever resource holds it.
    ///
    /// Callers must treat more than one result as an error.
    pub fn lookup_any_resource(&self, id: &EventId) -> Vec<&EventRecord> {
        self.by_id
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|resource| self.lookup(resource, id))
            .collect()
    }

    /// Events owned by `resource`, optionally restricted to some categories.
    pub fn events_of<'a>(
        &'a self,
        resource: &ResourceId,
        filter: Option<CategorySet>,
    ) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.by_resource
            .get(resource)
            .into_iter()
            .flat_map(IndexMap::values)
            .filter(move |e| filter.is_none_or(|f| f.contains(e.category)))
    }

    /// Set the transient pending flag. Returns `Some(changed)` if the event
    /// exists.
    pub fn set_pending(&mut self, resource: &ResourceId, id: &EventId, pending: bool) -> Option<bool> {
        let record = self.by_resource.get_mut(resource)?.get_mut(id)?;
        let changed = record.pending != pending;
        record.pending = pending;
        Some(changed)
    }

    /// Remove every event owned by `resource` in one step.
    pub fn evict_resource(&mut self, resource: &ResourceId) -> Vec<EventRecord> {
        let Some(events) = self.by_resource.remove(resource) else {
            return Vec::new();
        };
        for id in events.keys() {
            self.unlink(resource, id);
        }
        events.into_values().collect()
    }

    pub fn contains(&self, resource: &ResourceId, id: &EventId) -> bool {
        self.lookup(resource, id).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_resource.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty()
    }

    /// Ids currently held for `resource`, in insertion order.
    pub fn ids_of(&self, resource: &ResourceId) -> Vec<EventId> {
        self.by_resource
            .get(resource)
            .map(|events| events.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn unlink(&mut self, resource: &ResourceId, id: &EventId) {
        if let Some(owners) = self.by_id.get_mut(id) {
            owners.shift_remove(resource);
            if owners.is_empty() {
                self.by_id.remove(id);
            }
        } else {
            warn!(%resource, event = %id, "secondary index missing entry");
        }
    }
}
