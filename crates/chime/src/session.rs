//! One CLI run against the persisted backend.
//!
//! Loads the state file into a `MemoryBackend`, starts the engine and
//! bootstraps it. Closing flushes the engine and writes the state back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chime_config::Config;
use chime_core::{
    AlarmController, BootstrapReport, Collaborators, MemoryBackend, MemorySnapshot,
};
use tracing::{debug, info};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub struct Session {
    pub controller: AlarmController,
    pub bootstrap: BootstrapReport,
    backend: MemoryBackend,
    state_path: PathBuf,
}

/// Load the config named on the command line, or the canonical one.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = match &global.config {
        Some(path) => chime_config::load_config_from(path)?,
        None => chime_config::load_config()?,
    };
    Ok(cfg)
}

impl Session {
    pub async fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let cfg = load_config(global)?;
        let engine = chime_config::to_engine_config(&cfg)?;
        let state_path = global.state.clone().unwrap_or_else(|| cfg.state_file());

        let snapshot = read_snapshot(&state_path)?;
        debug!(
            path = %state_path.display(),
            collections = snapshot.collections.len(),
            items = snapshot.items.len(),
            "state loaded"
        );
        let (backend, events) = MemoryBackend::from_snapshot(snapshot);
        let controller = AlarmController::new(
            engine,
            Arc::new(backend.clone()),
            events,
            Collaborators::default(),
        );
        controller.start().await?;

        let bootstrap = controller.bootstrap().await?;
        // Make sure resynchronized items are indexed before queries run.
        controller.flush().await?;
        if !bootstrap.created.is_empty() {
            info!(created = bootstrap.created.len(), "default resources created");
        }

        Ok(Self {
            controller,
            bootstrap,
            backend,
            state_path,
        })
    }

    /// Stop the engine and persist the backend.
    pub async fn close(self) -> Result<(), CliError> {
        self.controller.flush().await?;
        self.controller.shutdown().await;
        write_snapshot(&self.state_path, &self.backend.snapshot())
    }
}

fn read_snapshot(path: &Path) -> Result<MemorySnapshot, CliError> {
    if !path.exists() {
        return Ok(MemorySnapshot::default());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn write_snapshot(path: &Path, snapshot: &MemorySnapshot) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(snapshot)?)?;
    debug!(path = %path.display(), "state saved");
    Ok(())
}
