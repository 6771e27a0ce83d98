// ── Command API ──
//
// Every write request flows through a unified `Command` enum. The engine
// validates it against current state, turns it into backend jobs and
// answers once those jobs have resolved.

use tokio::sync::oneshot;

use crate::bootstrap::BootstrapReport;
use crate::error::CoreError;
use crate::model::{
    AlarmCategory, CategorySet, Colour, CorrelationId, EventId, EventRecord, NewEvent, ResourceId,
};

pub(crate) type Responder = oneshot::Sender<Result<CommandResult, CoreError>>;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub correlation: CorrelationId,
    pub command: Command,
    pub response_tx: Responder,
}

/// All write operations against the alarm engine.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Event operations ─────────────────────────────────────────────
    /// Create an event. Without a resource it goes to the standard
    /// resource for its category.
    AddEvent {
        resource: Option<ResourceId>,
        event: NewEvent,
    },
    UpdateEvent {
        event: EventRecord,
    },
    /// Deleting an event that does not exist succeeds.
    DeleteEvent {
        resource: ResourceId,
        id: EventId,
    },
    SetPending {
        resource: ResourceId,
        id: EventId,
        pending: bool,
    },

    // ── Resource operations ──────────────────────────────────────────
    SetResourceEnabled {
        resource: ResourceId,
        category: AlarmCategory,
        enabled: bool,
    },
    SetResourceStandard {
        resource: ResourceId,
        categories: CategorySet,
    },
    SetBackgroundColour {
        resource: ResourceId,
        colour: Option<Colour>,
    },
    RemoveResource {
        resource: ResourceId,
    },
    SynchronizeResource {
        resource: ResourceId,
    },

    // ── Lifecycle ────────────────────────────────────────────────────
    Bootstrap,
    /// Answered once every backend notification queued before it has been
    /// applied.
    Flush,
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    EventAdded {
        resource: ResourceId,
        id: EventId,
    },
    /// Enabled types after policy reduction; `granted` may be smaller than
    /// `requested`.
    TypesGranted {
        requested: CategorySet,
        granted: CategorySet,
    },
    StandardGranted {
        requested: CategorySet,
        granted: CategorySet,
    },
    Bootstrap(BootstrapReport),
}

/// Handle to a submitted command.
#[derive(Debug)]
pub struct PendingRequest {
    id: CorrelationId,
    rx: oneshot::Receiver<Result<CommandResult, CoreError>>,
}

impl PendingRequest {
    pub(crate) fn new(id: CorrelationId, rx: oneshot::Receiver<Result<CommandResult, CoreError>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Wait for the engine's answer.
    pub async fn wait(self) -> Result<CommandResult, CoreError> {
        self.rx.await.map_err(|_| CoreError::EngineStopped)?
    }
}
