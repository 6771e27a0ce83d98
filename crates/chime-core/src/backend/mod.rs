// ── Storage backend interface ──
//
// The engine talks to storage exclusively through asynchronous jobs.
// A backend applies each job to its own item/collection tree, pushes the
// resulting change notifications, and only then reports the job outcome,
// all on one ordered channel.

mod memory;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumDiscriminants};

use crate::model::{
    CollectionAttributes, EventId, EventRecord, JobId, NewCollection, NewEvent, ResourceId,
    ResourceRecord,
};

pub use memory::{MemoryBackend, MemorySnapshot};

/// Whether the backend service is able to process jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceState {
    Running,
    Stopped,
}

/// One unit of asynchronous backend work.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(JobKind), derive(Hash, Display))]
pub enum Job {
    CreateItem {
        collection: ResourceId,
        event: NewEvent,
    },
    ModifyItem {
        event: EventRecord,
    },
    DeleteItem {
        collection: ResourceId,
        id: EventId,
    },
    CreateCollection(NewCollection),
    ModifyCollectionAttributes {
        collection: ResourceId,
        attributes: CollectionAttributes,
    },
    DeleteCollection {
        collection: ResourceId,
    },
    FetchCollections,
    SynchronizeResource {
        collection: ResourceId,
    },
    UpdateStorageFormat {
        collection: ResourceId,
    },
}

impl Job {
    pub fn kind(&self) -> JobKind {
        JobKind::from(self)
    }
}

/// Successful job output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    Done,
    ItemCreated(EventId),
    CollectionCreated(ResourceId),
    Collections(Vec<ResourceRecord>),
}

/// Outcome of a job; the error carries the backend's message.
pub type JobResult = Result<JobOutput, String>;

/// Everything a backend reports to the engine, in delivery order.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    CollectionAdded(ResourceRecord),
    /// Full current attributes of a collection after a change.
    CollectionChanged(ResourceRecord),
    CollectionRemoved(ResourceId),
    /// Complete item list of a collection after synchronization.
    CollectionSynced {
        collection: ResourceId,
        items: Vec<EventRecord>,
    },
    ItemAdded(EventRecord),
    ItemChanged(EventRecord),
    ItemRemoved {
        collection: ResourceId,
        id: EventId,
    },
    ResourceStateChanged(ResourceState),
    JobFinished {
        job: JobId,
        result: JobResult,
    },
}

/// Job submission side of a storage backend.
///
/// Implementations must deliver `JobFinished` for every submitted job, after
/// the change notifications that job caused.
pub trait StorageBackend: Send + Sync {
    fn submit(&self, job: Job) -> JobId;
}
