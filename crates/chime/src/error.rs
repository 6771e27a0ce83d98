//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use chime_config::ConfigError;
use chime_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const BACKEND: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Lookups ──────────────────────────────────────────────────────

    #[error("{kind} '{identifier}' not found")]
    #[diagnostic(
        code(chime::not_found),
        help("Run: chime {list_command} to see what exists")
    )]
    NotFound {
        kind: String,
        identifier: String,
        list_command: String,
    },

    #[error("Alarm '{identifier}' exists in {count} resources")]
    #[diagnostic(
        code(chime::ambiguous),
        help("Pass --resource to say which one you mean.")
    )]
    Ambiguous { identifier: String, count: usize },

    // ── Refused writes ───────────────────────────────────────────────

    #[error("Resource '{resource}' cannot be written")]
    #[diagnostic(code(chime::read_only), help("{reason}"))]
    NotWritable { resource: String, reason: String },

    #[error("No resource accepts {category} alarms")]
    #[diagnostic(
        code(chime::no_standard_resource),
        help(
            "Enable the type on a resource with: chime resources enable <RESOURCE> {category}\n\
             Or create the defaults with: chime bootstrap"
        )
    )]
    NoStandardResource { category: String },

    // ── Backend ──────────────────────────────────────────────────────

    #[error("The calendar backend rejected the change: {message}")]
    #[diagnostic(code(chime::backend))]
    Backend { message: String },

    #[error("The calendar backend did not answer after {attempts} attempts")]
    #[diagnostic(
        code(chime::timeout),
        help("Raise engine.bootstrap_retry_limit in the config file.")
    )]
    Timeout { attempts: u32 },

    #[error("Internal engine error: {message}")]
    #[diagnostic(code(chime::internal))]
    Internal { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(chime::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(chime::config),
        help("Check the file printed by: chime config path")
    )]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid state file: {0}")]
    #[diagnostic(
        code(chime::state),
        help("The state file is JSON written by chime; restore a backup or remove it.")
    )]
    Json(#[from] serde_json::Error),

    #[error("failed to render config: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Ambiguous { .. } => exit_code::CONFLICT,
            Self::NotWritable { .. } | Self::NoStandardResource { .. } => exit_code::PERMISSION,
            Self::Backend { .. } => exit_code::BACKEND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ResourceNotFound { id } => CliError::NotFound {
                kind: "Resource".into(),
                identifier: id.to_string(),
                list_command: "resources list".into(),
            },

            CoreError::EventNotFound { id, .. } => CliError::NotFound {
                kind: "Alarm".into(),
                identifier: id.to_string(),
                list_command: "alarms list".into(),
            },

            CoreError::AmbiguousId { id, count } => CliError::Ambiguous {
                identifier: id.to_string(),
                count,
            },

            CoreError::FormatIncompatible { id } => CliError::NotWritable {
                resource: id.to_string(),
                reason: "It uses an older storage format that must be converted first.".into(),
            },

            CoreError::ReadOnly { id, category } => CliError::NotWritable {
                resource: id.to_string(),
                reason: format!(
                    "It is read-only or {category} alarms are disabled on it.\n\
                     Try: chime resources enable {id} {category}"
                ),
            },

            CoreError::UnsupportedCategory { id, category } => CliError::NotWritable {
                resource: id.to_string(),
                reason: format!("It cannot hold {category} alarms."),
            },

            CoreError::NoStandardResource { category } => CliError::NoStandardResource { category },

            CoreError::BackendJobFailed { message } => CliError::Backend { message },

            CoreError::Timeout { attempts } => CliError::Timeout { attempts },

            CoreError::DuplicateId { .. } | CoreError::EngineStopped | CoreError::Internal(_) => {
                CliError::Internal {
                    message: err.to_string(),
                }
            }
        }
    }
}
