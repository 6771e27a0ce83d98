// ── Resource resynchronization ──
//
// Applies a backend's complete item list for one resource: upsert every
// reported item, then prune whatever the backend no longer has. Pending
// flags survive the refresh.

use chrono::Utc;
use tracing::debug;

use super::AlarmStore;
use crate::model::{EventId, EventRecord, ResourceId};

impl AlarmStore {
    /// Replace a resource's events with the backend's current items.
    ///
    /// Returns `(upserted, pruned)` counts. Items the resource cannot hold
    /// are dropped with a warning, as on any insert.
    pub(crate) fn replace_resource(&mut self, resource: &ResourceId, items: Vec<EventRecord>) -> (usize, usize) {
        if self.resource(resource).is_none() {
            debug!(%resource, "ignoring sync for unknown resource");
            return (0, 0);
        }

        let mut seen: Vec<EventId> = Vec::with_capacity(items.len());
        let mut upserted = 0;
        for mut item in items {
            item.resource_id = resource.clone();
            let id = item.id.clone();
            let unchanged = self
                .events
                .lookup(resource, &id)
                .is_some_and(|existing| same_payload(existing, &item));
            if unchanged {
                seen.push(id);
                continue;
            }
            if self.change_event(item).is_ok() {
                upserted += 1;
                seen.push(id);
            }
        }

        let stale: Vec<EventId> = self
            .events
            .ids_of(resource)
            .into_iter()
            .filter(|id| !seen.contains(id))
            .collect();
        for id in &stale {
            self.remove_event(resource, id);
        }

        self.last_sync.insert(resource.clone(), Utc::now());
        self.refresh_earliest(resource);
        debug!(%resource, upserted, pruned = stale.len(), "resource resynchronized");
        (upserted, stale.len())
    }
}

/// Equality ignoring the transient pending flag.
fn same_payload(existing: &EventRecord, incoming: &EventRecord) -> bool {
    existing.data() == incoming.data()
}
