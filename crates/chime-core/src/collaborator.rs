// ── External collaborators ──
//
// Hooks the engine calls out to: a sink for failures nobody is waiting on,
// and the question asked before a resource's storage format is upgraded.

use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use tracing::warn;

use crate::model::{ResourceId, ResourceRecord};

/// Receives failures that have no caller waiting for them.
pub trait ErrorReporter: Send + Sync {
    fn report_resource_error(&self, resource: Option<&ResourceId>, message: &str, details: &str);
}

/// Logs reported errors through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_resource_error(&self, resource: Option<&ResourceId>, message: &str, details: &str) {
        match resource {
            Some(resource) => warn!(%resource, details, "{message}"),
            None => warn!(details, "{message}"),
        }
    }
}

/// The user's answer to a format upgrade question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Update,
    /// Keep the old format and never ask again for this resource.
    KeepOldFormat,
    /// No decision; the question may be asked again in a later session.
    Dismissed,
}

/// Asks whether a resource in an older storage format should be upgraded.
pub trait FormatPrompter: Send + Sync {
    fn confirm_update(&self, resource: &ResourceRecord) -> BoxFuture<'static, PromptAnswer>;
}

/// Prompter for non-interactive use: every question is dismissed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DismissPrompts;

impl FormatPrompter for DismissPrompts {
    fn confirm_update(&self, _resource: &ResourceRecord) -> BoxFuture<'static, PromptAnswer> {
        Box::pin(future::ready(PromptAnswer::Dismissed))
    }
}

/// Collaborators handed to the engine at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub reporter: Arc<dyn ErrorReporter>,
    pub prompter: Arc<dyn FormatPrompter>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            reporter: Arc::new(TracingReporter),
            prompter: Arc::new(DismissPrompts),
        }
    }
}
