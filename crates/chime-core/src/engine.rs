// ── Engine task ──
//
// The single task that mutates engine state. It drains backend
// notifications, internal continuations (prompt answers, retry timers) and
// caller commands, holding the store's write lock for exactly one message.
// Notifications and command replies queued while handling a message are
// sent once the lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendEvent, Job, JobOutput, JobResult, ResourceState, StorageBackend};
use crate::bootstrap::{self, Bootstrapper, Phase};
use crate::collaborator::{Collaborators, PromptAnswer};
use crate::command::{Command, CommandEnvelope, CommandResult, Responder};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::migration::{AnswerAction, FormatMigrationCoordinator, MigrationAction};
use crate::model::{
    AlarmCategory, CollectionAttributes, FormatCompat, JobId, ResourceId, ResourceRecord, Rights,
};
use crate::notify::AlarmNotification;
use crate::policy;
use crate::store::{self, AlarmStore};

/// Continuations produced by tasks the engine spawned.
#[derive(Debug)]
pub(crate) enum Internal {
    PromptAnswered {
        resource: ResourceId,
        answer: PromptAnswer,
    },
    RetryFetch {
        attempt: u32,
    },
}

/// What a finished job means to the engine.
#[derive(Debug)]
enum JobPurpose {
    /// `CreateItem`: answer with the new event's id.
    AddEvent { resource: ResourceId },
    /// Answer the caller with a fixed result once the job succeeds.
    Reply(CommandResult),
    StandardPart { txn: u64 },
    BootstrapFetch,
    BootstrapCreate,
    FormatUpdate { resource: ResourceId },
    KeepOldFormat { resource: ResourceId },
    ResourceSync { resource: ResourceId },
}

impl JobPurpose {
    /// Resource a background job works on, if nobody awaits its result.
    fn background_resource(&self) -> Option<&ResourceId> {
        match self {
            Self::FormatUpdate { resource }
            | Self::KeepOldFormat { resource }
            | Self::ResourceSync { resource } => Some(resource),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PendingJob {
    purpose: JobPurpose,
    responder: Option<Responder>,
}

/// A standard-resource reassignment spanning several attribute writes.
/// Attribute reports for the involved resources are held back until every
/// job of the transaction has resolved.
#[derive(Debug)]
struct StandardTxn {
    target: ResourceId,
    involved: Vec<ResourceId>,
    outstanding: HashSet<JobId>,
    failures: Vec<String>,
    result: CommandResult,
    responder: Option<Responder>,
}

/// How a command is answered.
enum Outcome {
    Now(CommandResult),
    Job(JobId, JobPurpose),
    Transaction(u64),
    Bootstrap,
}

pub(crate) struct Engine {
    config: EngineConfig,
    store: Arc<RwLock<AlarmStore>>,
    backend: Arc<dyn StorageBackend>,
    collaborators: Collaborators,
    notify_tx: broadcast::Sender<AlarmNotification>,
    internal_tx: mpsc::UnboundedSender<Internal>,

    jobs: HashMap<JobId, PendingJob>,
    /// Attribute writes not yet confirmed, in submission order.
    in_flight_attributes: IndexMap<JobId, (ResourceId, CollectionAttributes)>,
    transactions: HashMap<u64, StandardTxn>,
    next_txn: u64,
    /// Latest attribute report per resource held back by a transaction.
    held_records: HashMap<ResourceId, ResourceRecord>,

    migration: FormatMigrationCoordinator,
    bootstrapper: Bootstrapper,
    bootstrap_waiters: Vec<Responder>,

    replies: Vec<(Responder, Result<CommandResult, CoreError>)>,
}

impl Engine {
    pub(crate) fn new(
        config: EngineConfig,
        store: Arc<RwLock<AlarmStore>>,
        backend: Arc<dyn StorageBackend>,
        collaborators: Collaborators,
        notify_tx: broadcast::Sender<AlarmNotification>,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        let migration = FormatMigrationCoordinator::new(config.auto_update_format);
        Self {
            config,
            store,
            backend,
            collaborators,
            notify_tx,
            internal_tx,
            jobs: HashMap::new(),
            in_flight_attributes: IndexMap::new(),
            transactions: HashMap::new(),
            next_txn: 0,
            held_records: HashMap::new(),
            migration,
            bootstrapper: Bootstrapper::new(),
            bootstrap_waiters: Vec::new(),
            replies: Vec::new(),
        }
    }

    /// Process messages until cancelled or every caller handle is gone.
    ///
    /// Outstanding callers see `EngineStopped` once the engine is dropped.
    pub(crate) async fn run(
        mut self,
        mut backend_rx: mpsc::UnboundedReceiver<BackendEvent>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        mut command_rx: mpsc::Receiver<CommandEnvelope>,
        cancel: CancellationToken,
    ) {
        info!("alarm engine started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(event) = backend_rx.recv() => {
                    self.step(|engine, store| engine.on_backend_event(store, event));
                }
                Some(message) = internal_rx.recv() => {
                    self.step(|engine, store| engine.on_internal(store, message));
                }
                envelope = command_rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    self.step(|engine, store| engine.on_command(store, envelope));
                }
            }
        }
        info!(outstanding = self.jobs.len(), "alarm engine stopped");
    }

    /// Handle one message under the write lock, then publish its effects.
    fn step(&mut self, handle: impl FnOnce(&mut Self, &mut AlarmStore)) {
        let shared = Arc::clone(&self.store);
        let notifications = {
            let mut guard = store::write(&shared);
            handle(self, &mut *guard);
            guard.take_notifications()
        };
        for notification in notifications {
            // No subscribers is fine.
            let _ = self.notify_tx.send(notification);
        }
        for (responder, result) in self.replies.drain(..) {
            let _ = responder.send(result);
        }
    }

    fn reply(&mut self, responder: Responder, result: Result<CommandResult, CoreError>) {
        self.replies.push((responder, result));
    }

    fn report(&self, resource: Option<&ResourceId>, message: &str, details: &str) {
        self.collaborators
            .reporter
            .report_resource_error(resource, message, details);
    }

    // ── Backend notifications ────────────────────────────────────────

    fn on_backend_event(&mut self, store: &mut AlarmStore, event: BackendEvent) {
        match event {
            BackendEvent::CollectionAdded(record) => self.apply_resource(store, record),
            BackendEvent::CollectionChanged(record) => {
                if self.held_by_transaction(&record.id) {
                    debug!(resource = %record.id, "holding attribute report for transaction");
                    self.held_records.insert(record.id.clone(), record);
                } else {
                    self.apply_resource(store, record);
                }
            }
            BackendEvent::CollectionRemoved(id) => {
                self.held_records.remove(&id);
                self.migration.forget(&id);
                self.jobs
                    .retain(|_, pending| pending.purpose.background_resource() != Some(&id));
                self.in_flight_attributes.retain(|_, (resource, _)| *resource != id);
                if store.remove_resource(&id).is_none() {
                    debug!(resource = %id, "removal of unknown resource ignored");
                }
            }
            BackendEvent::CollectionSynced { collection, items } => {
                store.replace_resource(&collection, items);
            }
            BackendEvent::ItemAdded(record) => {
                match store.add_event(record) {
                    Ok(()) => {}
                    Err(e @ CoreError::DuplicateId { .. }) => {
                        warn!(error = %e, "backend item already indexed");
                    }
                    Err(e) => debug!(error = %e, "backend item not indexed"),
                }
            }
            BackendEvent::ItemChanged(record) => {
                if let Err(e) = store.change_event(record) {
                    debug!(error = %e, "backend item change not applied");
                }
            }
            BackendEvent::ItemRemoved { collection, id } => {
                store.remove_event(&collection, &id);
            }
            BackendEvent::ResourceStateChanged(state) => {
                debug!(%state, "backend state changed");
                if state == ResourceState::Running
                    && self.bootstrapper.has_completed()
                    && !self.bootstrapper.is_running()
                {
                    info!("backend restarted, re-running bootstrap");
                    self.fetch_collections(1);
                }
            }
            BackendEvent::JobFinished { job, result } => self.on_job_finished(store, job, result),
        }
    }

    /// Cache a reported resource and react to whatever changed.
    fn apply_resource(&mut self, store: &mut AlarmStore, record: ResourceRecord) {
        let id = record.id.clone();
        let known = store.resource(&id).is_some();
        let changed = if known {
            !store.update_resource(record).is_empty()
        } else {
            store.add_resource(record)
        };
        if changed {
            self.check_format(store, &id);
            self.audit_policies(store);
        }
    }

    fn check_format(&mut self, store: &AlarmStore, id: &ResourceId) {
        let Some(record) = store.resource(id) else {
            return;
        };
        match self.migration.on_resource_state(record) {
            MigrationAction::None => {}
            MigrationAction::UpdateSilently => self.submit_format_update(id.clone()),
            MigrationAction::Prompt => {
                let answer = self.collaborators.prompter.confirm_update(record);
                let tx = self.internal_tx.clone();
                let resource = id.clone();
                tokio::spawn(async move {
                    let answer = answer.await;
                    let _ = tx.send(Internal::PromptAnswered { resource, answer });
                });
            }
        }
    }

    fn audit_policies(&self, store: &AlarmStore) {
        let all: Vec<&ResourceRecord> = store.resources().collect();
        for violation in policy::violations(&all) {
            warn!(?violation, "resource policy violated by backend state");
        }
    }

    // ── Internal continuations ───────────────────────────────────────

    fn on_internal(&mut self, store: &mut AlarmStore, message: Internal) {
        match message {
            Internal::PromptAnswered { resource, answer } => {
                let exists = store.resource(&resource).is_some();
                match self.migration.on_answer(&resource, answer, exists) {
                    AnswerAction::Update => self.submit_format_update(resource),
                    AnswerAction::KeepOldFormat(attributes) => {
                        match self.submit_attributes(store, &resource, attributes) {
                            Ok(job) => self.track(job, JobPurpose::KeepOldFormat { resource }, None),
                            Err(e) => debug!(error = %e, "format choice not saved"),
                        }
                    }
                    AnswerAction::None => {}
                }
            }
            Internal::RetryFetch { attempt } => {
                if matches!(self.bootstrapper.phase(), Phase::WaitingRetry { .. }) {
                    self.fetch_collections(attempt);
                }
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn on_command(&mut self, store: &mut AlarmStore, envelope: CommandEnvelope) {
        let CommandEnvelope {
            correlation,
            command,
            response_tx,
        } = envelope;
        debug!(%correlation, ?command, "command received");

        match self.route(store, command) {
            Ok(Outcome::Now(result)) => self.reply(response_tx, Ok(result)),
            Ok(Outcome::Job(job, purpose)) => self.track(job, purpose, Some(response_tx)),
            Ok(Outcome::Transaction(txn)) => match self.transactions.get_mut(&txn) {
                Some(t) => t.responder = Some(response_tx),
                None => self.reply(response_tx, Err(CoreError::Internal("transaction vanished".into()))),
            },
            Ok(Outcome::Bootstrap) => self.bootstrap_waiters.push(response_tx),
            Err(e) => {
                debug!(%correlation, error = %e, "command rejected");
                self.reply(response_tx, Err(e));
            }
        }
    }

    fn route(&mut self, store: &mut AlarmStore, command: Command) -> Result<Outcome, CoreError> {
        match command {
            // ── Event operations ─────────────────────────────────────
            Command::AddEvent { resource, event } => {
                let resource = match resource {
                    Some(id) => id,
                    None => store.standard_resource(event.category, true).ok_or_else(|| {
                        CoreError::NoStandardResource {
                            category: event.category.to_string(),
                        }
                    })?,
                };
                let record = require_resource(store, &resource)?;
                check_writable(record, event.category, Rights::CAN_CREATE)?;
                let job = self.backend.submit(Job::CreateItem {
                    collection: resource.clone(),
                    event,
                });
                Ok(Outcome::Job(job, JobPurpose::AddEvent { resource }))
            }

            Command::UpdateEvent { event } => {
                let resource = event.resource_id.clone();
                if store.event(&resource, &event.id).is_none() {
                    return Err(CoreError::EventNotFound {
                        resource,
                        id: event.id,
                    });
                }
                let record = require_resource(store, &resource)?;
                check_writable(record, event.category, Rights::CAN_CHANGE)?;
                let job = self.backend.submit(Job::ModifyItem { event });
                Ok(Outcome::Job(job, JobPurpose::Reply(CommandResult::Ok)))
            }

            Command::DeleteEvent { resource, id } => {
                let Some(event) = store.event(&resource, &id) else {
                    debug!(%resource, event = %id, "delete of missing event is a no-op");
                    return Ok(Outcome::Now(CommandResult::Ok));
                };
                let category = event.category;
                let record = require_resource(store, &resource)?;
                check_writable(record, category, Rights::CAN_DELETE)?;
                let job = self.backend.submit(Job::DeleteItem {
                    collection: resource,
                    id,
                });
                Ok(Outcome::Job(job, JobPurpose::Reply(CommandResult::Ok)))
            }

            Command::SetPending {
                resource,
                id,
                pending,
            } => {
                store.set_pending(&resource, &id, pending)?;
                Ok(Outcome::Now(CommandResult::Ok))
            }

            // ── Resource operations ──────────────────────────────────
            Command::SetResourceEnabled {
                resource,
                category,
                enabled,
            } => {
                let all = self.effective_resources(store);
                let current = find(&all, &resource)?;
                let plan = policy::plan_enable(current, category, enabled, &all);
                let result = CommandResult::TypesGranted {
                    requested: plan.requested,
                    granted: plan.granted,
                };
                if plan.granted != plan.requested {
                    debug!(%resource, requested = %plan.requested, granted = %plan.granted, "enable request reduced");
                }
                if plan.attributes.is_empty() {
                    return Ok(Outcome::Now(result));
                }
                let job = self.submit_attributes(store, &resource, plan.attributes)?;
                Ok(Outcome::Job(job, JobPurpose::Reply(result)))
            }

            Command::SetResourceStandard {
                resource,
                categories,
            } => {
                let all = self.effective_resources(store);
                let current = find(&all, &resource)?;
                let plan = policy::plan_standard(current, categories, &all);
                let result = CommandResult::StandardGranted {
                    requested: plan.requested,
                    granted: plan.granted,
                };
                if plan.is_no_op(current) {
                    return Ok(Outcome::Now(result));
                }
                let txn = self.begin_standard_txn(store, plan, result)?;
                Ok(Outcome::Transaction(txn))
            }

            Command::SetBackgroundColour { resource, colour } => {
                let attributes = CollectionAttributes {
                    background_colour: Some(colour),
                    ..CollectionAttributes::default()
                };
                let job = self.submit_attributes(store, &resource, attributes)?;
                Ok(Outcome::Job(job, JobPurpose::Reply(CommandResult::Ok)))
            }

            Command::RemoveResource { resource } => {
                require_resource(store, &resource)?;
                let job = self.backend.submit(Job::DeleteCollection {
                    collection: resource,
                });
                Ok(Outcome::Job(job, JobPurpose::Reply(CommandResult::Ok)))
            }

            Command::SynchronizeResource { resource } => {
                require_resource(store, &resource)?;
                let job = self.backend.submit(Job::SynchronizeResource {
                    collection: resource,
                });
                Ok(Outcome::Job(job, JobPurpose::Reply(CommandResult::Ok)))
            }

            // ── Lifecycle ────────────────────────────────────────────
            Command::Bootstrap => {
                if !self.bootstrapper.is_running() {
                    self.fetch_collections(1);
                }
                Ok(Outcome::Bootstrap)
            }

            Command::Flush => Ok(Outcome::Now(CommandResult::Ok)),
        }
    }

    /// Cached records with held attribute reports and unconfirmed
    /// attribute writes layered on top, so back-to-back requests see each
    /// other's effect.
    fn effective_resources(&self, store: &AlarmStore) -> Vec<ResourceRecord> {
        store
            .resources()
            .map(|cached| {
                let mut record = self
                    .held_records
                    .get(&cached.id)
                    .cloned()
                    .unwrap_or_else(|| cached.clone());
                for (resource, attributes) in self.in_flight_attributes.values() {
                    if *resource == record.id {
                        attributes.apply_to(&mut record);
                    }
                }
                record
            })
            .collect()
    }

    fn submit_attributes(
        &mut self,
        store: &AlarmStore,
        resource: &ResourceId,
        attributes: CollectionAttributes,
    ) -> Result<JobId, CoreError> {
        let handle = store
            .handle(resource)
            .ok_or_else(|| CoreError::ResourceNotFound { id: resource.clone() })?;
        let job = handle.request(self.backend.as_ref(), attributes.clone());
        self.in_flight_attributes
            .insert(job, (resource.clone(), attributes));
        Ok(job)
    }

    fn track(&mut self, job: JobId, purpose: JobPurpose, responder: Option<Responder>) {
        debug!(%job, ?purpose, "tracking job");
        self.jobs.insert(job, PendingJob { purpose, responder });
    }

    // ── Standard-resource transactions ───────────────────────────────

    fn begin_standard_txn(
        &mut self,
        store: &AlarmStore,
        plan: policy::StandardPlan,
        result: CommandResult,
    ) -> Result<u64, CoreError> {
        self.next_txn += 1;
        let txn = self.next_txn;

        let mut involved = Vec::with_capacity(plan.clears.len() + 1);
        let mut outstanding = HashSet::new();
        for (resource, standard) in plan.clears {
            let job = self.submit_attributes(
                store,
                &resource,
                CollectionAttributes {
                    standard_for: Some(standard),
                    ..CollectionAttributes::default()
                },
            )?;
            self.track(job, JobPurpose::StandardPart { txn }, None);
            outstanding.insert(job);
            involved.push(resource);
        }
        let job = self.submit_attributes(
            store,
            &plan.resource,
            CollectionAttributes {
                standard_for: Some(plan.granted),
                ..CollectionAttributes::default()
            },
        )?;
        self.track(job, JobPurpose::StandardPart { txn }, None);
        outstanding.insert(job);
        involved.push(plan.resource.clone());

        debug!(txn, target = %plan.resource, jobs = outstanding.len(), "standard transaction started");
        self.transactions.insert(
            txn,
            StandardTxn {
                target: plan.resource,
                involved,
                outstanding,
                failures: Vec::new(),
                result,
                responder: None,
            },
        );
        Ok(txn)
    }

    fn held_by_transaction(&self, resource: &ResourceId) -> bool {
        self.transactions
            .values()
            .any(|t| !t.outstanding.is_empty() && t.involved.contains(resource))
    }

    fn standard_part_finished(&mut self, store: &mut AlarmStore, txn: u64, job: JobId, result: JobResult) {
        let Some(t) = self.transactions.get_mut(&txn) else {
            return;
        };
        t.outstanding.remove(&job);
        if let Err(message) = result {
            t.failures.push(message);
        }
        if !t.outstanding.is_empty() {
            return;
        }
        let Some(t) = self.transactions.remove(&txn) else {
            return;
        };

        // Apply every confirmed change together. Failed writes produced no
        // report, so only what the backend accepted lands in the cache.
        for resource in &t.involved {
            if self.held_by_transaction(resource) {
                continue;
            }
            if let Some(record) = self.held_records.remove(resource) {
                self.apply_resource(store, record);
            }
        }

        let outcome = if t.failures.is_empty() {
            debug!(txn, "standard transaction committed");
            Ok(t.result)
        } else {
            let details = t.failures.join("; ");
            warn!(txn, target = %t.target, %details, "standard transaction partially failed");
            self.report(Some(&t.target), "Failed to update the standard resource", &details);
            Err(CoreError::backend(details))
        };
        if let Some(responder) = t.responder {
            self.reply(responder, outcome);
        }
    }

    // ── Job completion ───────────────────────────────────────────────

    fn on_job_finished(&mut self, store: &mut AlarmStore, job: JobId, result: JobResult) {
        self.in_flight_attributes.shift_remove(&job);
        let Some(PendingJob { purpose, responder }) = self.jobs.remove(&job) else {
            debug!(%job, "untracked job finished");
            return;
        };
        if let Some(resource) = purpose.background_resource() {
            if store.resource(resource).is_none() {
                debug!(%job, %resource, "job finished for removed resource");
                return;
            }
        }

        match purpose {
            JobPurpose::AddEvent { resource } => {
                let outcome = match result {
                    Ok(JobOutput::ItemCreated(id)) => Ok(CommandResult::EventAdded { resource, id }),
                    Ok(other) => Err(CoreError::Internal(format!("unexpected job output {other:?}"))),
                    Err(message) => Err(CoreError::backend(message)),
                };
                self.answer(responder, outcome);
            }
            JobPurpose::Reply(reply) => {
                let outcome = result.map(|_| reply).map_err(CoreError::backend);
                self.answer(responder, outcome);
            }
            JobPurpose::StandardPart { txn } => self.standard_part_finished(store, txn, job, result),
            JobPurpose::BootstrapFetch => self.fetch_finished(store, job, result),
            JobPurpose::BootstrapCreate => self.creation_finished(store, job, result),
            JobPurpose::FormatUpdate { resource } => {
                let success = result.is_ok();
                self.migration.on_update_finished(&resource, success);
                match result {
                    Ok(_) => info!(%resource, "storage format updated"),
                    Err(message) => {
                        self.report(Some(&resource), "Failed to update the storage format", &message);
                    }
                }
            }
            JobPurpose::KeepOldFormat { resource } => {
                if let Err(message) = result {
                    self.report(Some(&resource), "Failed to save the storage format choice", &message);
                }
            }
            JobPurpose::ResourceSync { resource } => {
                if let Err(message) = result {
                    self.report(Some(&resource), "Failed to synchronize resource", &message);
                }
            }
        }
    }

    /// Send a job outcome to its caller, or report a failure nobody waits on.
    fn answer(&mut self, responder: Option<Responder>, outcome: Result<CommandResult, CoreError>) {
        match responder {
            Some(responder) => self.reply(responder, outcome),
            None => {
                if let Err(e) = outcome {
                    self.report(None, "Background operation failed", &e.to_string());
                }
            }
        }
    }

    fn submit_format_update(&mut self, resource: ResourceId) {
        let job = self.backend.submit(Job::UpdateStorageFormat {
            collection: resource.clone(),
        });
        self.track(job, JobPurpose::FormatUpdate { resource }, None);
    }

    // ── Bootstrap ────────────────────────────────────────────────────

    fn fetch_collections(&mut self, attempt: u32) {
        let job = self.backend.submit(Job::FetchCollections);
        debug!(%job, attempt, "fetching collections");
        self.track(job, JobPurpose::BootstrapFetch, None);
        self.bootstrapper.fetching(job, attempt);
    }

    fn fetch_finished(&mut self, store: &mut AlarmStore, job: JobId, result: JobResult) {
        let Some(attempt) = self.bootstrapper.fetch_attempt(job) else {
            return;
        };
        let collections = match result {
            Ok(JobOutput::Collections(collections)) => collections,
            Ok(other) => {
                warn!(?other, "unexpected output from collection fetch");
                Vec::new()
            }
            Err(message) => {
                self.fetch_failed(attempt, &message);
                return;
            }
        };

        for record in collections {
            let id = record.id.clone();
            self.apply_resource(store, record);
            let job = self.backend.submit(Job::SynchronizeResource {
                collection: id.clone(),
            });
            self.track(job, JobPurpose::ResourceSync { resource: id }, None);
        }

        let plan = bootstrap::plan(
            store.resources(),
            &self.config.legacy_calendars,
            &self.config.data_dir,
        );
        if plan.migrates_legacy {
            info!(calendars = self.config.legacy_calendars.len(), "migrating legacy calendars");
        }
        let mut jobs = Vec::with_capacity(plan.creations.len());
        for new in plan.creations {
            let name = new.name.clone();
            let job = self.backend.submit(Job::CreateCollection(new));
            self.track(job, JobPurpose::BootstrapCreate, None);
            jobs.push((job, name));
        }
        self.bootstrapper.creating(jobs, plan.migrates_legacy);
        if self.bootstrapper.creations_done() {
            self.complete_bootstrap(store);
        }
    }

    fn fetch_failed(&mut self, attempt: u32, message: &str) {
        if attempt < self.config.bootstrap_retry_limit {
            debug!(attempt, error = message, "collection fetch failed, retrying");
            self.bootstrapper.waiting_retry(attempt);
            let tx = self.internal_tx.clone();
            let interval = self.config.bootstrap_retry_interval;
            tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                let _ = tx.send(Internal::RetryFetch {
                    attempt: attempt + 1,
                });
            });
            return;
        }

        warn!(attempts = attempt, "backend never listed its collections");
        self.report(None, "Timed out waiting for the calendar backend", message);
        self.bootstrapper.abort();
        for waiter in std::mem::take(&mut self.bootstrap_waiters) {
            self.reply(waiter, Err(CoreError::Timeout { attempts: attempt }));
        }
    }

    fn creation_finished(&mut self, store: &mut AlarmStore, job: JobId, result: JobResult) {
        if !self.bootstrapper.owns_creation(job) {
            return;
        }
        let result = match result {
            Ok(JobOutput::CollectionCreated(id)) => Ok(id),
            Ok(other) => Err(format!("unexpected job output {other:?}")),
            Err(message) => Err(message),
        };
        if let Some(failure) = self.bootstrapper.creation_finished(job, result) {
            self.report(
                None,
                &format!("Failed to create calendar '{}'", failure.name),
                &failure.error,
            );
        }
        if self.bootstrapper.creations_done() {
            self.complete_bootstrap(store);
        }
    }

    fn complete_bootstrap(&mut self, store: &mut AlarmStore) {
        let report = self.bootstrapper.finish();
        info!(
            created = report.created.len(),
            failed = report.failed.len(),
            resources = store.resource_count(),
            "bootstrap complete"
        );
        store.notify(AlarmNotification::MigrationCompleted {
            created: report.created.len(),
            failed: report.failed.len(),
        });
        for waiter in std::mem::take(&mut self.bootstrap_waiters) {
            self.reply(waiter, Ok(CommandResult::Bootstrap(report.clone())));
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn require_resource<'a>(store: &'a AlarmStore, id: &ResourceId) -> Result<&'a ResourceRecord, CoreError> {
    store
        .resource(id)
        .ok_or_else(|| CoreError::ResourceNotFound { id: id.clone() })
}

fn find<'a>(all: &'a [ResourceRecord], id: &ResourceId) -> Result<&'a ResourceRecord, CoreError> {
    all.iter()
        .find(|r| r.id == *id)
        .ok_or_else(|| CoreError::ResourceNotFound { id: id.clone() })
}

/// Item writes need the current format, the right category and rights.
fn check_writable(
    record: &ResourceRecord,
    category: AlarmCategory,
    right: Rights,
) -> Result<(), CoreError> {
    if record.format != FormatCompat::Current {
        return Err(CoreError::FormatIncompatible {
            id: record.id.clone(),
        });
    }
    if !record.supports(category) {
        return Err(CoreError::UnsupportedCategory {
            id: record.id.clone(),
            category: category.to_string(),
        });
    }
    if !record.is_enabled_for(category) || !record.rights.contains(right) {
        return Err(CoreError::ReadOnly {
            id: record.id.clone(),
            category: category.to_string(),
        });
    }
    Ok(())
}
