// ── In-memory storage backend ──
//
// Keeps collections and items in process memory and reports every change
// on an unbounded channel. Used by the command-line tool (persisted as a
// JSON snapshot) and by tests, which can hold jobs back, inject failures
// and mutate storage behind the engine's back.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::{BackendEvent, Job, JobKind, JobOutput, JobResult, ResourceState, StorageBackend};
use crate::model::{
    EventId, EventRecord, FormatCompat, JobId, NewCollection, NewEvent, ResourceId, ResourceRecord,
};

/// Serializable image of a [`MemoryBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub collections: Vec<ResourceRecord>,
    #[serde(default)]
    pub items: Vec<EventRecord>,
    #[serde(default)]
    pub next_collection: u64,
    #[serde(default)]
    pub next_item: u64,
}

#[derive(Default)]
struct MemoryState {
    collections: IndexMap<ResourceId, ResourceRecord>,
    items: HashMap<ResourceId, IndexMap<EventId, EventRecord>>,
    next_collection: u64,
    next_item: u64,
    next_job: u64,
    running: bool,
    holding: bool,
    held: VecDeque<(JobId, Job)>,
    failures: HashMap<JobKind, u32>,
    submitted: HashMap<JobKind, usize>,
}

/// Storage backend living entirely in memory.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

impl MemoryBackend {
    /// Create an empty, running backend and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        Self::from_snapshot(MemorySnapshot::default())
    }

    /// Restore a backend from a snapshot. Restored data is not announced;
    /// the engine discovers it through `FetchCollections`.
    pub fn from_snapshot(snapshot: MemorySnapshot) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = MemoryState {
            running: true,
            next_collection: snapshot.next_collection,
            next_item: snapshot.next_item,
            ..MemoryState::default()
        };
        for mut record in snapshot.collections {
            // Opening the storage settles its format; older snapshots omit it.
            if record.format == FormatCompat::Unknown {
                record.format = FormatCompat::Current;
            }
            state.collections.insert(record.id.clone(), record);
        }
        for item in snapshot.items {
            state
                .items
                .entry(item.resource_id.clone())
                .or_default()
                .insert(item.id.clone(), item);
        }
        let backend = Self {
            state: Arc::new(Mutex::new(state)),
            events: tx,
        };
        (backend, rx)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let state = self.lock();
        MemorySnapshot {
            collections: state.collections.values().cloned().collect(),
            items: state
                .collections
                .keys()
                .filter_map(|id| state.items.get(id))
                .flat_map(IndexMap::values)
                .cloned()
                .collect(),
            next_collection: state.next_collection,
            next_item: state.next_item,
        }
    }

    // ── Test and tooling controls ────────────────────────────────────

    /// Start or stop the simulated backend service. While stopped every job
    /// fails.
    pub fn set_running(&self, running: bool) {
        self.lock().running = running;
        let state = if running {
            ResourceState::Running
        } else {
            ResourceState::Stopped
        };
        self.emit(BackendEvent::ResourceStateChanged(state));
    }

    /// Queue submitted jobs instead of executing them until
    /// [`release`](Self::release) is called.
    pub fn hold_jobs(&self) {
        self.lock().holding = true;
    }

    /// Execute every held job in submission order and stop holding.
    pub fn release(&self) {
        let held: Vec<_> = {
            let mut state = self.lock();
            state.holding = false;
            state.held.drain(..).collect()
        };
        for (id, job) in held {
            self.execute(id, job);
        }
    }

    /// Make the next `times` jobs of `kind` fail.
    pub fn fail_next(&self, kind: JobKind, times: u32) {
        *self.lock().failures.entry(kind).or_default() += times;
    }

    /// How many jobs of `kind` have been submitted so far.
    pub fn submitted(&self, kind: JobKind) -> usize {
        self.lock().submitted.get(&kind).copied().unwrap_or(0)
    }

    pub fn collection(&self, id: &ResourceId) -> Option<ResourceRecord> {
        self.lock().collections.get(id).cloned()
    }

    pub fn collections(&self) -> Vec<ResourceRecord> {
        self.lock().collections.values().cloned().collect()
    }

    pub fn items(&self, collection: &ResourceId) -> Vec<EventRecord> {
        self.lock()
            .items
            .get(collection)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    // ── External changes ─────────────────────────────────────────────
    //
    // Mutations made by some other client of the storage. They bypass the
    // job queue and are announced like any other change.

    pub fn insert_collection(&self, new: NewCollection) -> ResourceId {
        let record = self.lock().create_collection(new);
        let id = record.id.clone();
        self.emit(BackendEvent::CollectionAdded(record));
        id
    }

    /// Edit a collection's attributes in place. Returns `false` if it does
    /// not exist.
    pub fn edit_collection(&self, id: &ResourceId, edit: impl FnOnce(&mut ResourceRecord)) -> bool {
        let changed = {
            let mut state = self.lock();
            let Some(record) = state.collections.get_mut(id) else {
                return false;
            };
            edit(record);
            record.clone()
        };
        self.emit(BackendEvent::CollectionChanged(changed));
        true
    }

    pub fn remove_collection(&self, id: &ResourceId) -> bool {
        let removed = self.lock().delete_collection(id);
        if removed {
            self.emit(BackendEvent::CollectionRemoved(id.clone()));
        }
        removed
    }

    /// Store an item without any category checks.
    pub fn insert_item(&self, collection: &ResourceId, data: NewEvent) -> Option<EventId> {
        let record = self.lock().create_item(collection, data)?;
        let id = record.id.clone();
        self.emit(BackendEvent::ItemAdded(record));
        Some(id)
    }

    pub fn edit_item(
        &self,
        collection: &ResourceId,
        id: &EventId,
        edit: impl FnOnce(&mut EventRecord),
    ) -> bool {
        let changed = {
            let mut state = self.lock();
            let Some(record) = state.items.get_mut(collection).and_then(|i| i.get_mut(id)) else {
                return false;
            };
            edit(record);
            record.clone()
        };
        self.emit(BackendEvent::ItemChanged(changed));
        true
    }

    pub fn remove_item(&self, collection: &ResourceId, id: &EventId) -> bool {
        let removed = self
            .lock()
            .items
            .get_mut(collection)
            .and_then(|items| items.shift_remove(id))
            .is_some();
        if removed {
            self.emit(BackendEvent::ItemRemoved {
                collection: collection.clone(),
                id: id.clone(),
            });
        }
        removed
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BackendEvent) {
        if self.events.send(event).is_err() {
            debug!("backend event dropped: engine receiver closed");
        }
    }

    fn execute(&self, id: JobId, job: Job) {
        let kind = job.kind();
        let (events, result) = {
            let mut state = self.lock();
            if !state.running {
                (Vec::new(), Err("backend service is not running".to_owned()))
            } else if state.take_failure(kind) {
                (Vec::new(), Err(format!("{kind} failed")))
            } else {
                state.run(job)
            }
        };
        debug!(job = %id, %kind, ok = result.is_ok(), "memory backend job finished");
        for event in events {
            self.emit(event);
        }
        self.emit(BackendEvent::JobFinished { job: id, result });
    }
}

impl StorageBackend for MemoryBackend {
    fn submit(&self, job: Job) -> JobId {
        let mut state = self.lock();
        state.next_job += 1;
        let id = JobId(state.next_job);
        *state.submitted.entry(job.kind()).or_default() += 1;
        if state.holding {
            state.held.push_back((id, job));
            return id;
        }
        drop(state);
        self.execute(id, job);
        id
    }
}

impl MemoryState {
    fn take_failure(&mut self, kind: JobKind) -> bool {
        match self.failures.get_mut(&kind) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    fn create_collection(&mut self, new: NewCollection) -> ResourceRecord {
        self.next_collection += 1;
        let id = ResourceId::new(format!("col-{}", self.next_collection));
        let mut record = ResourceRecord::new(id.clone(), new.name, new.location, new.supported_types);
        record.enabled_types = new.enabled_types & record.supported_types;
        record.standard_for = new.standard_for & record.enabled_types;
        record.rights = new.rights;
        record.background_colour = new.background_colour;
        self.collections.insert(id, record.clone());
        record
    }

    fn delete_collection(&mut self, id: &ResourceId) -> bool {
        self.items.remove(id);
        self.collections.shift_remove(id).is_some()
    }

    fn create_item(&mut self, collection: &ResourceId, data: NewEvent) -> Option<EventRecord> {
        if !self.collections.contains_key(collection) {
            return None;
        }
        self.next_item += 1;
        let id = EventId::new(format!("evt-{}", self.next_item));
        let record = EventRecord::new(id.clone(), collection.clone(), data);
        self.items
            .entry(collection.clone())
            .or_default()
            .insert(id, record.clone());
        Some(record)
    }

    /// Apply one job, returning the notifications it caused and its result.
    fn run(&mut self, job: Job) -> (Vec<BackendEvent>, JobResult) {
        match job {
            Job::CreateItem { collection, event } => match self.create_item(&collection, event) {
                Some(record) => {
                    let id = record.id.clone();
                    (vec![BackendEvent::ItemAdded(record)], Ok(JobOutput::ItemCreated(id)))
                }
                None => (Vec::new(), Err(format!("no such collection: {collection}"))),
            },
            Job::ModifyItem { event } => {
                let slot = self
                    .items
                    .get_mut(&event.resource_id)
                    .and_then(|items| items.get_mut(&event.id));
                match slot {
                    Some(slot) => {
                        *slot = EventRecord {
                            pending: false,
                            ..event
                        };
                        (vec![BackendEvent::ItemChanged(slot.clone())], Ok(JobOutput::Done))
                    }
                    None => (Vec::new(), Err(format!("no such item: {}", event.id))),
                }
            }
            Job::DeleteItem { collection, id } => {
                let removed = self
                    .items
                    .get_mut(&collection)
                    .and_then(|items| items.shift_remove(&id))
                    .is_some();
                let events = if removed {
                    vec![BackendEvent::ItemRemoved { collection, id }]
                } else {
                    Vec::new()
                };
                (events, Ok(JobOutput::Done))
            }
            Job::CreateCollection(new) => {
                let record = self.create_collection(new);
                let id = record.id.clone();
                (
                    vec![BackendEvent::CollectionAdded(record)],
                    Ok(JobOutput::CollectionCreated(id)),
                )
            }
            Job::ModifyCollectionAttributes {
                collection,
                attributes,
            } => match self.collections.get_mut(&collection) {
                Some(record) => {
                    let before = record.clone();
                    attributes.apply_to(record);
                    let events = if *record == before {
                        Vec::new()
                    } else {
                        vec![BackendEvent::CollectionChanged(record.clone())]
                    };
                    (events, Ok(JobOutput::Done))
                }
                None => (Vec::new(), Err(format!("no such collection: {collection}"))),
            },
            Job::DeleteCollection { collection } => {
                if self.delete_collection(&collection) {
                    (vec![BackendEvent::CollectionRemoved(collection)], Ok(JobOutput::Done))
                } else {
                    (Vec::new(), Ok(JobOutput::Done))
                }
            }
            Job::FetchCollections => (
                Vec::new(),
                Ok(JobOutput::Collections(
                    self.collections.values().cloned().collect(),
                )),
            ),
            Job::SynchronizeResource { collection } => {
                if !self.collections.contains_key(&collection) {
                    return (Vec::new(), Err(format!("no such collection: {collection}")));
                }
                let items = self
                    .items
                    .get(&collection)
                    .map(|items| items.values().cloned().collect())
                    .unwrap_or_default();
                (
                    vec![BackendEvent::CollectionSynced { collection, items }],
                    Ok(JobOutput::Done),
                )
            }
            Job::UpdateStorageFormat { collection } => match self.collections.get_mut(&collection) {
                Some(record) if record.format == FormatCompat::Incompatible => (
                    Vec::new(),
                    Err(format!("{collection} cannot be converted")),
                ),
                Some(record) => {
                    record.format = FormatCompat::Current;
                    record.keep_old_format = false;
                    (vec![BackendEvent::CollectionChanged(record.clone())], Ok(JobOutput::Done))
                }
                None => (Vec::new(), Err(format!("no such collection: {collection}"))),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AlarmCategory, CategorySet, Rights};

    fn new_collection(name: &str) -> NewCollection {
        NewCollection {
            name: name.into(),
            location: format!("/{name}.ics"),
            supported_types: CategorySet::single(AlarmCategory::Active),
            enabled_types: CategorySet::single(AlarmCategory::Active),
            standard_for: CategorySet::EMPTY,
            rights: Rights::ALL,
            background_colour: None,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<BackendEvent>) -> Vec<BackendEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn notifications_precede_job_completion() {
        let (backend, mut rx) = MemoryBackend::new();
        let job = backend.submit(Job::CreateCollection(new_collection("a")));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BackendEvent::CollectionAdded(_)));
        match &events[1] {
            BackendEvent::JobFinished { job: id, result } => {
                assert_eq!(*id, job);
                assert!(matches!(result, Ok(JobOutput::CollectionCreated(_))));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn held_jobs_run_on_release() {
        let (backend, mut rx) = MemoryBackend::new();
        backend.hold_jobs();
        backend.submit(Job::FetchCollections);
        assert!(drain(&mut rx).is_empty());

        backend.release();
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let (backend, mut rx) = MemoryBackend::new();
        backend.fail_next(JobKind::FetchCollections, 1);
        backend.submit(Job::FetchCollections);
        backend.submit(Job::FetchCollections);

        let results: Vec<bool> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::JobFinished { result, .. } => Some(result.is_ok()),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec![false, true]);
        assert_eq!(backend.submitted(JobKind::FetchCollections), 2);
    }

    #[test]
    fn snapshot_restores_collections_and_items() {
        let (backend, _rx) = MemoryBackend::new();
        let id = backend.insert_collection(new_collection("a"));
        let data = NewEvent {
            category: AlarmCategory::Active,
            enabled: true,
            next_trigger: None,
            date_only: false,
            summary: "x".into(),
        };
        backend.insert_item(&id, data).unwrap();

        let snapshot = backend.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let (restored, _rx) = MemoryBackend::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.collections().len(), 1);
        assert_eq!(restored.items(&id).len(), 1);

        let next = restored.insert_collection(new_collection("b"));
        assert_eq!(next.as_str(), "col-2");
    }

    #[test]
    fn snapshot_without_format_loads_as_current() {
        let (backend, _rx) = MemoryBackend::new();
        let id = backend.insert_collection(new_collection("a"));

        let mut json = serde_json::to_value(backend.snapshot()).unwrap();
        json["collections"][0].as_object_mut().unwrap().remove("format");
        let (restored, _rx) = MemoryBackend::from_snapshot(serde_json::from_value(json).unwrap());

        let record = restored.collection(&id).unwrap();
        assert_eq!(record.format, FormatCompat::Current);
        assert!(record.is_writable_for(AlarmCategory::Active));
    }

    #[test]
    fn stopped_backend_fails_jobs() {
        let (backend, mut rx) = MemoryBackend::new();
        backend.set_running(false);
        backend.submit(Job::FetchCollections);
        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            BackendEvent::ResourceStateChanged(ResourceState::Stopped)
        ));
        assert!(matches!(
            events[1],
            BackendEvent::JobFinished { result: Err(_), .. }
        ));
    }
}
