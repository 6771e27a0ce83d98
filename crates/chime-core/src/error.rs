// ── Core error types ──
//
// Errors surfaced to callers of the alarm engine. Backend failures are
// carried as messages; callers never see backend internals directly.

use thiserror::Error;

use crate::model::{EventId, ResourceId};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Resource not found: {id}")]
    ResourceNotFound { id: ResourceId },

    #[error("Alarm no longer exists: {id} in {resource}")]
    EventNotFound { resource: ResourceId, id: EventId },

    #[error("Alarm id {id} is held by {count} resources")]
    AmbiguousId { id: EventId, count: usize },

    // ── Index invariant violations ───────────────────────────────────
    #[error("Duplicate alarm id {id} in resource {resource}")]
    DuplicateId { resource: ResourceId, id: EventId },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Backend job failed: {message}")]
    BackendJobFailed { message: String },

    #[error("Resource {id} must be converted to the current format before it can be written")]
    FormatIncompatible { id: ResourceId },

    #[error("Resource {id} is read-only or not enabled for {category} alarms")]
    ReadOnly { id: ResourceId, category: String },

    #[error("No writable resource for {category} alarms")]
    NoStandardResource { category: String },

    #[error("Unsupported alarm type for resource {id}: {category}")]
    UnsupportedCategory { id: ResourceId, category: String },

    #[error("Backend did not respond after {attempts} attempts")]
    Timeout { attempts: u32 },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Alarm engine is not running")]
    EngineStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn backend(message: impl Into<String>) -> Self {
        Self::BackendJobFailed {
            message: message.into(),
        }
    }

    /// Whether this error means the target vanished underneath the caller.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ResourceNotFound { .. } | Self::EventNotFound { .. }
        )
    }
}
