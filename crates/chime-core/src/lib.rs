// chime-core: Resource and event consistency engine for alarm calendars.

pub mod backend;
pub mod bootstrap;
pub mod collaborator;
pub mod command;
pub mod config;
pub mod controller;
mod engine;
pub mod error;
pub mod migration;
pub mod model;
pub mod notify;
pub mod policy;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{
    BackendEvent, Job, JobKind, JobOutput, JobResult, MemoryBackend, MemorySnapshot, ResourceState,
    StorageBackend,
};
pub use bootstrap::{BootstrapFailure, BootstrapReport, LegacyCalendar};
pub use collaborator::{
    Collaborators, DismissPrompts, ErrorReporter, FormatPrompter, PromptAnswer, TracingReporter,
};
pub use command::{Command, CommandResult, PendingRequest};
pub use config::EngineConfig;
pub use controller::{AlarmController, EngineState};
pub use error::CoreError;
pub use notify::{AlarmNotification, NotificationStream, StatusChange};
pub use store::AlarmStore;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AlarmCategory, CategorySet, CollectionAttributes, Colour, CorrelationId, EventId, EventRecord,
    FormatCompat, JobId, NewCollection, NewEvent, ResourceId, ResourceRecord, Rights,
};
