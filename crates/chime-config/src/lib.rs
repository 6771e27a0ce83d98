//! Shared configuration for the chime tools.
//!
//! A TOML file with engine settings and the legacy calendar list, merged
//! with `CHIME_` environment overrides, and its translation to
//! `chime_core::EngineConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chime_core::{AlarmCategory, Colour, EngineConfig, LegacyCalendar};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Output defaults for the command-line tool.
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub engine: EngineSection,

    /// Calendars from the pre-resource configuration, as `[[legacy]]`
    /// tables.
    #[serde(default)]
    pub legacy: Vec<LegacyEntry>,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineSection {
    /// Where default calendar files are created. Platform data dir if unset.
    pub data_dir: Option<PathBuf>,

    /// Backend state file used by the command-line tool.
    pub state_file: Option<PathBuf>,

    #[serde(default)]
    pub auto_update_format: bool,

    #[serde(default = "default_retry_limit")]
    pub bootstrap_retry_limit: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub bootstrap_retry_interval_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            state_file: None,
            auto_update_format: false,
            bootstrap_retry_limit: default_retry_limit(),
            bootstrap_retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_retry_limit() -> u32 {
    10
}
fn default_retry_interval_ms() -> u64 {
    200
}

/// One legacy calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LegacyEntry {
    pub name: String,

    /// "active", "archived" or "template".
    pub kind: String,

    /// Calendar file; relative paths resolve against the data directory.
    pub path: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub standard: bool,

    #[serde(default)]
    pub read_only: bool,

    /// Background colour as `#rrggbb`.
    pub colour: Option<String>,
}

fn default_true() -> bool {
    true
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "chime", "chime")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default data directory for calendar files and backend state.
pub fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("data"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("chime");
    p
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        self.engine.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Backend state file, defaulting to `state.json` in the data dir.
    pub fn state_file(&self) -> PathBuf {
        self.engine
            .state_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("state.json"))
    }
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest with a double underscore, e.g.
/// `CHIME_ENGINE__AUTO_UPDATE_FORMAT=true`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CHIME_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Engine translation ──────────────────────────────────────────────

/// Build the engine configuration, validating the legacy entries.
pub fn to_engine_config(cfg: &Config) -> Result<EngineConfig, ConfigError> {
    if cfg.engine.bootstrap_retry_limit == 0 {
        return Err(ConfigError::Validation {
            field: "engine.bootstrap_retry_limit".into(),
            reason: "must be at least 1".into(),
        });
    }

    let legacy_calendars = cfg
        .legacy
        .iter()
        .enumerate()
        .map(|(i, entry)| legacy_calendar(i, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EngineConfig {
        data_dir: cfg.data_dir(),
        legacy_calendars,
        auto_update_format: cfg.engine.auto_update_format,
        bootstrap_retry_limit: cfg.engine.bootstrap_retry_limit,
        bootstrap_retry_interval: Duration::from_millis(cfg.engine.bootstrap_retry_interval_ms),
        ..EngineConfig::default()
    })
}

fn legacy_calendar(index: usize, entry: &LegacyEntry) -> Result<LegacyCalendar, ConfigError> {
    let category: AlarmCategory = entry.kind.parse().map_err(|_| ConfigError::Validation {
        field: format!("legacy[{index}].kind"),
        reason: format!(
            "expected 'active', 'archived' or 'template', got '{}'",
            entry.kind
        ),
    })?;
    if !AlarmCategory::STORABLE.contains(&category) {
        return Err(ConfigError::Validation {
            field: format!("legacy[{index}].kind"),
            reason: format!("'{category}' calendars cannot be stored"),
        });
    }

    let colour = entry
        .colour
        .as_deref()
        .map(str::parse::<Colour>)
        .transpose()
        .map_err(|reason| ConfigError::Validation {
            field: format!("legacy[{index}].colour"),
            reason,
        })?;

    Ok(LegacyCalendar {
        name: entry.name.clone(),
        category,
        location: entry.path.clone(),
        enabled: entry.enabled,
        standard: entry.standard,
        read_only: entry.read_only,
        colour,
    })
}
