// ── Resource handle ──
//
// The only writer of a cached resource record. Attribute writes go to the
// backend as jobs; the cache changes only when the backend reports the
// resource's new attributes.

use crate::backend::{Job, StorageBackend};
use crate::model::{CollectionAttributes, JobId, ResourceId, ResourceRecord};
use crate::notify::StatusChange;

#[derive(Debug, Clone)]
pub struct ResourceHandle {
    record: ResourceRecord,
}

impl ResourceHandle {
    /// Wrap a record reported by the backend, clamping the enabled and
    /// standard sets to what the resource can hold.
    pub fn new(mut record: ResourceRecord) -> Self {
        sanitize(&mut record);
        Self { record }
    }

    pub fn id(&self) -> &ResourceId {
        &self.record.id
    }

    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    /// Ask the backend to write attributes. The cached record is untouched.
    pub fn request(&self, backend: &dyn StorageBackend, attributes: CollectionAttributes) -> JobId {
        backend.submit(Job::ModifyCollectionAttributes {
            collection: self.record.id.clone(),
            attributes,
        })
    }

    /// Replace the cached record with the backend's current one and report
    /// which observable attributes actually changed.
    pub(crate) fn apply(&mut self, mut incoming: ResourceRecord) -> Vec<StatusChange> {
        sanitize(&mut incoming);
        let old = &self.record;
        let mut changes = Vec::new();

        if incoming.supported_types != old.supported_types {
            changes.push(StatusChange::AlarmTypes(incoming.supported_types));
        }
        if incoming.enabled_types != old.enabled_types {
            changes.push(StatusChange::Enabled(incoming.enabled_types));
        }
        if incoming.standard_for != old.standard_for {
            changes.push(StatusChange::Standard(incoming.standard_for));
        }
        if incoming.is_read_only() != old.is_read_only() {
            changes.push(StatusChange::ReadOnly(incoming.is_read_only()));
        }
        if incoming.format != old.format {
            changes.push(StatusChange::Format(incoming.format));
        }
        if incoming.keep_old_format != old.keep_old_format {
            changes.push(StatusChange::KeepOldFormat(incoming.keep_old_format));
        }
        if incoming.background_colour != old.background_colour {
            changes.push(StatusChange::Colour(incoming.background_colour));
        }
        if incoming.name != old.name {
            changes.push(StatusChange::Name(incoming.name.clone()));
        }
        if incoming.location != old.location {
            changes.push(StatusChange::Location(incoming.location.clone()));
        }

        self.record = incoming;
        changes
    }
}

fn sanitize(record: &mut ResourceRecord) {
    record.enabled_types = record.enabled_types & record.supported_types;
    record.standard_for = record.standard_for & record.enabled_types;
}
