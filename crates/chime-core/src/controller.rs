// ── Controller abstraction ──
//
// Public handle to the alarm engine. Owns the shared store, spawns the
// engine task, routes commands to it and serves read-only queries
// straight from the store.

use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{BackendEvent, StorageBackend};
use crate::bootstrap::BootstrapReport;
use crate::collaborator::Collaborators;
use crate::command::{Command, CommandEnvelope, CommandResult, PendingRequest};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::CoreError;
use crate::model::{
    AlarmCategory, CategorySet, CorrelationId, EventId, EventRecord, ResourceId, ResourceRecord,
};
use crate::notify::{AlarmNotification, NotificationStream};
use crate::store::{self, AlarmStore};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── EngineState ──────────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopped,
}

// ── AlarmController ──────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Queries read the store
/// directly and never wait for the engine; commands are answered by the
/// engine task once their backend jobs have resolved.
#[derive(Clone)]
pub struct AlarmController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: EngineConfig,
    store: Arc<RwLock<AlarmStore>>,
    backend: Arc<dyn StorageBackend>,
    collaborators: Collaborators,
    state: watch::Sender<EngineState>,
    notify_tx: broadcast::Sender<AlarmNotification>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    backend_rx: Mutex<Option<mpsc::UnboundedReceiver<BackendEvent>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AlarmController {
    /// Create a controller for `backend`, whose notifications arrive on
    /// `backend_events`. Does NOT start processing -- call
    /// [`start()`](Self::start).
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn StorageBackend>,
        backend_events: mpsc::UnboundedReceiver<BackendEvent>,
        collaborators: Collaborators,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        let (notify_tx, _) = broadcast::channel(config.notification_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store: Arc::new(RwLock::new(AlarmStore::new())),
                backend,
                collaborators,
                state,
                notify_tx,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                backend_rx: Mutex::new(Some(backend_events)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the engine task. Starting twice is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        let command_rx = self.inner.command_rx.lock().await.take();
        let backend_rx = self.inner.backend_rx.lock().await.take();
        let (Some(command_rx), Some(backend_rx)) = (command_rx, backend_rx) else {
            debug!("engine already started");
            return Ok(());
        };

        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let engine = Engine::new(
            self.inner.config.clone(),
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.backend),
            self.inner.collaborators.clone(),
            self.inner.notify_tx.clone(),
            internal_tx,
        );
        let cancel = self.inner.cancel.clone();
        let handle = tokio::spawn(engine.run(backend_rx, internal_rx, command_rx, cancel));
        self.inner.task_handles.lock().await.push(handle);

        self.inner.state.send_replace(EngineState::Running);
        Ok(())
    }

    /// Stop the engine task and wait for it to exit. Requests still in
    /// flight fail with [`CoreError::EngineStopped`].
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        self.inner.state.send_replace(EngineState::Stopped);
        debug!("engine shut down");
    }

    /// One-shot: start, run closure, shut down.
    pub async fn oneshot<F, Fut, T>(
        config: EngineConfig,
        backend: Arc<dyn StorageBackend>,
        backend_events: mpsc::UnboundedReceiver<BackendEvent>,
        collaborators: Collaborators,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(AlarmController) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let controller = Self::new(config, backend, backend_events, collaborators);
        controller.start().await?;
        let result = f(controller.clone()).await;
        controller.shutdown().await;
        result
    }

    // ── Command execution ────────────────────────────────────────────

    /// Hand a command to the engine without waiting for its outcome.
    pub async fn submit(&self, command: Command) -> Result<PendingRequest, CoreError> {
        if *self.inner.state.borrow() != EngineState::Running {
            return Err(CoreError::EngineStopped);
        }
        let correlation = CorrelationId::new();
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                correlation,
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::EngineStopped)?;
        Ok(PendingRequest::new(correlation, rx))
    }

    /// Execute a command and wait for its outcome.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        self.submit(command).await?.wait().await
    }

    /// Make sure every alarm category has a resource, migrating legacy
    /// calendars on first run.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, CoreError> {
        match self.execute(Command::Bootstrap).await? {
            CommandResult::Bootstrap(report) => Ok(report),
            other => Err(CoreError::Internal(format!(
                "unexpected bootstrap result {other:?}"
            ))),
        }
    }

    /// Wait until the engine has applied every backend notification queued
    /// so far.
    pub async fn flush(&self) -> Result<(), CoreError> {
        self.execute(Command::Flush).await.map(|_| ())
    }

    // ── State observation ────────────────────────────────────────────

    pub fn engine_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to raw notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmNotification> {
        self.inner.notify_tx.subscribe()
    }

    /// Subscribe to notifications as a `Stream`.
    pub fn notifications(&self) -> NotificationStream {
        NotificationStream::new(self.subscribe())
    }

    // ── Queries (read the store directly) ────────────────────────────

    /// Run `f` against a consistent view of the store.
    pub fn with_store<T>(&self, f: impl FnOnce(&AlarmStore) -> T) -> T {
        f(&store::read(&self.inner.store))
    }

    pub fn event(&self, resource: &ResourceId, id: &EventId) -> Option<EventRecord> {
        self.with_store(|s| s.event(resource, id).cloned())
    }

    pub fn events_of(&self, resource: &ResourceId, filter: Option<CategorySet>) -> Vec<EventRecord> {
        self.with_store(|s| s.events_of(resource, filter).cloned().collect())
    }

    /// Find an event by id alone. Errors if more than one resource holds it.
    pub fn event_by_global_id(&self, id: &EventId) -> Result<Option<EventRecord>, CoreError> {
        self.with_store(|s| s.event_by_global_id(id).map(|e| e.cloned()))
    }

    pub fn earliest_trigger(&self, resource: &ResourceId) -> Option<EventRecord> {
        self.with_store(|s| s.earliest_trigger(resource).cloned())
    }

    pub fn global_earliest_trigger(&self) -> Option<EventRecord> {
        self.with_store(|s| s.global_earliest_trigger().cloned())
    }

    pub fn resource(&self, id: &ResourceId) -> Option<ResourceRecord> {
        self.with_store(|s| s.resource(id).cloned())
    }

    pub fn resources(&self) -> Vec<ResourceRecord> {
        self.with_store(|s| s.resources().cloned().collect())
    }

    pub fn resources_supporting(&self, category: AlarmCategory) -> Vec<ResourceRecord> {
        self.with_store(|s| s.resources_supporting(category).cloned().collect())
    }

    pub fn standard_resource(&self, category: AlarmCategory, use_fallback: bool) -> Option<ResourceId> {
        self.with_store(|s| s.standard_resource(category, use_fallback))
    }
}
