// ── Runtime engine configuration ──
//
// Describes how the engine behaves. Never touches disk: the composition
// root builds an `EngineConfig` (usually from `chime-config`) and hands it
// in.

use std::path::PathBuf;
use std::time::Duration;

use crate::bootstrap::LegacyCalendar;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory where default resource files are created.
    pub data_dir: PathBuf,
    /// Calendars from the pre-resource configuration, migrated once.
    pub legacy_calendars: Vec<LegacyCalendar>,
    /// Upgrade convertible resources without asking.
    pub auto_update_format: bool,
    /// How many times bootstrap asks the backend for its collections.
    pub bootstrap_retry_limit: u32,
    pub bootstrap_retry_interval: Duration,
    /// Buffer size of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            legacy_calendars: Vec::new(),
            auto_update_format: false,
            bootstrap_retry_limit: 10,
            bootstrap_retry_interval: Duration::from_millis(200),
            notification_capacity: 256,
        }
    }
}
