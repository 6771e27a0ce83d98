// ── Alarm store ──
//
// Owns the cached resources, the event index and the earliest-trigger
// cache. Only the engine task mutates it, one backend message at a time;
// every mutation queues the notifications it caused in an outbox which the
// engine publishes once the write lock is released.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::earliest::{EarliestTriggerCache, affects_earliest};
use super::event_index::EventIndex;
use super::resource_handle::ResourceHandle;
use crate::error::CoreError;
use crate::model::{AlarmCategory, CategorySet, EventId, EventRecord, ResourceId, ResourceRecord};
use crate::notify::{AlarmNotification, StatusChange};
use crate::policy;

#[derive(Debug, Default)]
pub struct AlarmStore {
    pub(super) resources: IndexMap<ResourceId, ResourceHandle>,
    pub(super) events: EventIndex,
    pub(super) earliest: EarliestTriggerCache,
    pub(super) last_sync: HashMap<ResourceId, DateTime<Utc>>,
    outbox: Vec<AlarmNotification>,
}

impl AlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Resource queries ─────────────────────────────────────────────

    pub fn resource(&self, id: &ResourceId) -> Option<&ResourceRecord> {
        self.resources.get(id).map(ResourceHandle::record)
    }

    pub(crate) fn handle(&self, id: &ResourceId) -> Option<&ResourceHandle> {
        self.resources.get(id)
    }

    /// All cached resources in discovery order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceRecord> + Clone {
        self.resources.values().map(ResourceHandle::record)
    }

    /// Resources able to hold events of `category`.
    pub fn resources_supporting(&self, category: AlarmCategory) -> impl Iterator<Item = &ResourceRecord> {
        self.resources().filter(move |r| r.supports(category))
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn standard_resource(&self, category: AlarmCategory, use_fallback: bool) -> Option<ResourceId> {
        policy::get_standard(category, use_fallback, self.resources())
    }

    /// When the resource's items were last fully resynchronized.
    pub fn last_synced(&self, id: &ResourceId) -> Option<DateTime<Utc>> {
        self.last_sync.get(id).copied()
    }

    // ── Event queries ────────────────────────────────────────────────

    pub fn event(&self, resource: &ResourceId, id: &EventId) -> Option<&EventRecord> {
        self.events.lookup(resource, id)
    }

    pub fn events_of(
        &self,
        resource: &ResourceId,
        filter: Option<CategorySet>,
    ) -> impl Iterator<Item = &EventRecord> {
        self.events.events_of(resource, filter)
    }

    /// Find an event knowing only its id. More than one holder is an error.
    pub fn event_by_global_id(&self, id: &EventId) -> Result<Option<&EventRecord>, CoreError> {
        let found = self.events.lookup_any_resource(id);
        match found.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            many => Err(CoreError::AmbiguousId {
                id: id.clone(),
                count: many.len(),
            }),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn earliest_trigger(&self, resource: &ResourceId) -> Option<&EventRecord> {
        let id = self.earliest.get(resource)?;
        self.events.lookup(resource, id)
    }

    /// Soonest active alarm across every resource enabled for active alarms.
    pub fn global_earliest_trigger(&self) -> Option<&EventRecord> {
        let (resource, id) = self.earliest.global_earliest(|r| {
            self.resource(r)
                .is_some_and(|r| r.is_enabled_for(AlarmCategory::Active))
        })?;
        self.events.lookup(&resource, &id)
    }

    // ── Resource mutations ───────────────────────────────────────────

    /// Cache a resource reported by the backend. A resource already known
    /// is treated as an attribute update.
    pub(crate) fn add_resource(&mut self, record: ResourceRecord) -> bool {
        if self.resources.contains_key(&record.id) {
            self.update_resource(record);
            return false;
        }
        let handle = ResourceHandle::new(record);
        debug!(resource = %handle.id(), "resource added");
        self.outbox
            .push(AlarmNotification::ResourceAdded(handle.record().clone()));
        self.resources.insert(handle.id().clone(), handle);
        true
    }

    /// Apply a backend attribute report. Returns the changes actually made;
    /// a report equal to the cached record changes nothing.
    pub(crate) fn update_resource(&mut self, record: ResourceRecord) -> Vec<StatusChange> {
        let id = record.id.clone();
        let Some(handle) = self.resources.get_mut(&id) else {
            self.add_resource(record);
            return Vec::new();
        };
        let was_active = handle.record().is_enabled_for(AlarmCategory::Active);
        let changes = handle.apply(record);
        let supported = handle.record().supported_types;
        let now_active = handle.record().is_enabled_for(AlarmCategory::Active);

        for change in &changes {
            self.outbox.push(AlarmNotification::ResourceStatusChanged {
                resource: id.clone(),
                change: change.clone(),
            });
        }

        if changes
            .iter()
            .any(|c| matches!(c, StatusChange::AlarmTypes(_)))
        {
            self.evict_unsupported(&id, supported);
        }
        if was_active != now_active && self.earliest.get(&id).is_some() {
            self.outbox
                .push(AlarmNotification::EarliestTriggerChanged(id.clone()));
        }
        changes
    }

    /// Drop a resource and every event it owns in one step.
    pub(crate) fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceRecord> {
        let handle = self.resources.shift_remove(id)?;
        for event in self.events.evict_resource(id) {
            self.outbox.push(AlarmNotification::EventAboutToBeRemoved {
                resource: id.clone(),
                event,
            });
        }
        if self.earliest.forget(id) {
            self.outbox
                .push(AlarmNotification::EarliestTriggerChanged(id.clone()));
        }
        self.last_sync.remove(id);
        debug!(resource = %id, "resource removed");
        self.outbox.push(AlarmNotification::ResourceRemoved(id.clone()));
        Some(handle.record().clone())
    }

    // ── Event mutations ──────────────────────────────────────────────

    /// Index an event the backend reported as created.
    pub(crate) fn add_event(&mut self, record: EventRecord) -> Result<(), CoreError> {
        let resource = record.resource_id.clone();
        self.check_category(&record)?;
        self.events.insert(&resource, record.clone())?;
        self.outbox.push(AlarmNotification::EventAdded {
            resource: resource.clone(),
            event: record.clone(),
        });
        if affects_earliest(None, Some(&record)) {
            self.refresh_earliest(&resource);
        }
        Ok(())
    }

    /// Apply a changed event. An unknown event is indexed as new; one whose
    /// category its resource no longer accepts is dropped.
    pub(crate) fn change_event(&mut self, record: EventRecord) -> Result<(), CoreError> {
        let resource = record.resource_id.clone();
        if !self.events.contains(&resource, &record.id) {
            return self.add_event(record);
        }
        if let Err(e) = self.check_category(&record) {
            self.remove_event(&resource, &record.id);
            return Err(e);
        }
        let old = self.events.update(record)?;
        let new = self
            .events
            .lookup(&resource, &old.id)
            .cloned()
            .ok_or_else(|| CoreError::Internal(format!("event {} vanished during update", old.id)))?;
        let dirty = affects_earliest(Some(&old), Some(&new));
        self.outbox.push(AlarmNotification::EventChanged {
            resource: resource.clone(),
            event: new,
        });
        if dirty {
            self.refresh_earliest(&resource);
        }
        Ok(())
    }

    pub(crate) fn remove_event(&mut self, resource: &ResourceId, id: &EventId) -> Option<EventRecord> {
        let existing = self.events.lookup(resource, id)?.clone();
        self.outbox.push(AlarmNotification::EventAboutToBeRemoved {
            resource: resource.clone(),
            event: existing,
        });
        let removed = self.events.remove(resource, id)?;
        if affects_earliest(Some(&removed), None) {
            self.refresh_earliest(resource);
        }
        Some(removed)
    }

    /// Toggle the notifier's pending flag. Returns whether it changed.
    pub(crate) fn set_pending(
        &mut self,
        resource: &ResourceId,
        id: &EventId,
        pending: bool,
    ) -> Result<bool, CoreError> {
        let changed = self
            .events
            .set_pending(resource, id, pending)
            .ok_or_else(|| CoreError::EventNotFound {
                resource: resource.clone(),
                id: id.clone(),
            })?;
        if changed {
            self.refresh_earliest(resource);
        }
        Ok(changed)
    }

    // ── Outbox ───────────────────────────────────────────────────────

    pub(crate) fn notify(&mut self, notification: AlarmNotification) {
        self.outbox.push(notification);
    }

    pub(crate) fn take_notifications(&mut self) -> Vec<AlarmNotification> {
        std::mem::take(&mut self.outbox)
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Events may only be indexed under a known resource that supports
    /// their category.
    fn check_category(&self, record: &EventRecord) -> Result<(), CoreError> {
        let resource = &record.resource_id;
        let Some(owner) = self.resource(resource) else {
            warn!(%resource, event = %record.id, "dropping event for unknown resource");
            return Err(CoreError::ResourceNotFound {
                id: resource.clone(),
            });
        };
        if !owner.supports(record.category) {
            warn!(
                %resource,
                event = %record.id,
                category = %record.category,
                "dropping event of unsupported category"
            );
            return Err(CoreError::UnsupportedCategory {
                id: resource.clone(),
                category: record.category.to_string(),
            });
        }
        Ok(())
    }

    fn evict_unsupported(&mut self, resource: &ResourceId, supported: CategorySet) {
        let doomed: Vec<EventId> = self
            .events
            .events_of(resource, None)
            .filter(|e| !supported.contains(e.category.storage_category()))
            .map(|e| e.id.clone())
            .collect();
        for id in doomed {
            warn!(%resource, event = %id, "evicting event no longer supported by its resource");
            self.remove_event(resource, &id);
        }
    }

    pub(super) fn refresh_earliest(&mut self, resource: &ResourceId) {
        let events = self
            .events
            .events_of(resource, Some(CategorySet::single(AlarmCategory::Active)));
        if self.earliest.recompute(resource, events) {
            self.outbox
                .push(AlarmNotification::EarliestTriggerChanged(resource.clone()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{FormatCompat, NewEvent};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn resource(id: &str, supported: CategorySet) -> ResourceRecord {
        let mut r = ResourceRecord::new(ResourceId::from(id), id, format!("/{id}.ics"), supported);
        r.enabled_types = supported;
        r
    }

    fn active(id: &str, resource: &str, secs: i64) -> EventRecord {
        EventRecord::new(
            EventId::from(id),
            ResourceId::from(resource),
            NewEvent::active(at(secs), id),
        )
    }

    fn store_with(resources: &[ResourceRecord]) -> AlarmStore {
        let mut store = AlarmStore::new();
        for r in resources {
            store.add_resource(r.clone());
        }
        store.take_notifications();
        store
    }

    #[test]
    fn scenario_c_pending_event_is_skipped_until_released() {
        let r = ResourceId::from("r");
        let mut store = store_with(&[resource("r", CategorySet::STORABLE)]);
        store.add_event(active("e1", "r", 100)).unwrap();
        store.add_event(active("e2", "r", 50)).unwrap();
        store.set_pending(&r, &EventId::from("e2"), true).unwrap();
        assert_eq!(store.earliest_trigger(&r).unwrap().id, EventId::from("e1"));

        store.take_notifications();
        assert!(store.set_pending(&r, &EventId::from("e2"), false).unwrap());
        assert_eq!(store.earliest_trigger(&r).unwrap().id, EventId::from("e2"));
        assert!(
            store
                .take_notifications()
                .iter()
                .any(|n| matches!(n, AlarmNotification::EarliestTriggerChanged(id) if *id == r))
        );
    }

    #[test]
    fn duplicate_event_keeps_first_copy() {
        let r = ResourceId::from("r");
        let mut store = store_with(&[resource("r", CategorySet::STORABLE)]);
        store.add_event(active("e1", "r", 100)).unwrap();
        store.take_notifications();

        let err = store.add_event(active("e1", "r", 5)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
        assert_eq!(store.event(&r, &EventId::from("e1")).unwrap().next_trigger, Some(at(100)));
        assert!(store.take_notifications().is_empty());
    }

    #[test]
    fn events_of_unsupported_category_are_rejected() {
        let mut store = store_with(&[resource("r", CategorySet::single(AlarmCategory::Archived))]);
        let err = store.add_event(active("e1", "r", 10)).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedCategory { .. }));
        assert_eq!(store.event_count(), 0);
    }

    #[test]
    fn events_of_unknown_resource_are_rejected() {
        let mut store = AlarmStore::new();
        assert!(store.add_event(active("e1", "ghost", 10)).is_err());
        assert!(store.take_notifications().is_empty());
    }

    #[test]
    fn removing_resource_evicts_its_events() {
        let r = ResourceId::from("r");
        let mut store = store_with(&[resource("r", CategorySet::STORABLE)]);
        store.add_event(active("e1", "r", 10)).unwrap();
        store.add_event(active("e2", "r", 20)).unwrap();
        store.take_notifications();

        store.remove_resource(&r).unwrap();
        assert_eq!(store.events_of(&r, None).count(), 0);
        assert_eq!(store.event_by_global_id(&EventId::from("e1")).unwrap(), None);
        assert!(store.earliest_trigger(&r).is_none());

        let notes = store.take_notifications();
        let about_to_go = notes
            .iter()
            .filter(|n| matches!(n, AlarmNotification::EventAboutToBeRemoved { .. }))
            .count();
        assert_eq!(about_to_go, 2);
        assert!(matches!(notes.last(), Some(AlarmNotification::ResourceRemoved(_))));
    }

    #[test]
    fn no_op_attribute_report_is_suppressed() {
        let record = resource("r", CategorySet::STORABLE);
        let mut store = store_with(std::slice::from_ref(&record));
        assert!(store.update_resource(record).is_empty());
        assert!(store.take_notifications().is_empty());
    }

    #[test]
    fn shrinking_supported_types_evicts_events() {
        let mut record = resource("r", CategorySet::STORABLE);
        let mut store = store_with(std::slice::from_ref(&record));
        store.add_event(active("e1", "r", 10)).unwrap();

        record.supported_types = CategorySet::single(AlarmCategory::Archived);
        let changes = store.update_resource(record);
        assert!(changes.contains(&StatusChange::AlarmTypes(CategorySet::single(
            AlarmCategory::Archived
        ))));
        assert_eq!(store.event_count(), 0);
    }

    #[test]
    fn global_earliest_ignores_resources_not_enabled_for_active() {
        let mut r2 = resource("r2", CategorySet::STORABLE);
        let mut store = store_with(&[resource("r1", CategorySet::STORABLE), r2.clone()]);
        store.add_event(active("late", "r1", 300)).unwrap();
        store.add_event(active("soon", "r2", 100)).unwrap();
        assert_eq!(store.global_earliest_trigger().unwrap().id, EventId::from("soon"));

        r2.enabled_types = CategorySet::single(AlarmCategory::Archived);
        store.update_resource(r2);
        assert_eq!(store.global_earliest_trigger().unwrap().id, EventId::from("late"));
    }

    #[test]
    fn ambiguous_global_id_is_an_error() {
        let mut store = store_with(&[
            resource("r1", CategorySet::STORABLE),
            resource("r2", CategorySet::STORABLE),
        ]);
        store.add_event(active("e", "r1", 10)).unwrap();
        store.add_event(active("e", "r2", 10)).unwrap();
        assert!(matches!(
            store.event_by_global_id(&EventId::from("e")),
            Err(CoreError::AmbiguousId { count: 2, .. })
        ));
    }

    #[test]
    fn change_of_unknown_event_inserts_it() {
        let mut store = store_with(&[resource("r", CategorySet::STORABLE)]);
        store.change_event(active("e1", "r", 10)).unwrap();
        assert_eq!(store.event_count(), 1);
    }

    #[test]
    fn format_change_is_reported() {
        let mut record = resource("r", CategorySet::STORABLE);
        let mut store = store_with(std::slice::from_ref(&record));
        record.format = FormatCompat::Convertible;
        assert_eq!(
            store.update_resource(record),
            vec![StatusChange::Format(FormatCompat::Convertible)]
        );
    }
}
