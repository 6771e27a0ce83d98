// ── Alarm event domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::AlarmCategory;
use super::ids::{EventId, ResourceId};

/// One alarm as held in the event index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub resource_id: ResourceId,
    pub category: AlarmCategory,
    pub enabled: bool,
    pub next_trigger: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_only: bool,
    #[serde(default)]
    pub summary: String,

    /// Set while the notifier is processing this alarm. Never persisted.
    #[serde(skip)]
    pub pending: bool,
}

impl EventRecord {
    pub fn new(id: EventId, resource_id: ResourceId, data: NewEvent) -> Self {
        Self {
            id,
            resource_id,
            category: data.category,
            enabled: data.enabled,
            next_trigger: data.next_trigger,
            date_only: data.date_only,
            summary: data.summary,
            pending: false,
        }
    }

    /// Whether this event takes part in earliest-trigger selection.
    pub fn is_trigger_candidate(&self) -> bool {
        self.category == AlarmCategory::Active
            && self.enabled
            && !self.pending
            && self.next_trigger.is_some()
    }

    /// Strip identity, leaving the payload sent to the backend.
    pub fn data(&self) -> NewEvent {
        NewEvent {
            category: self.category,
            enabled: self.enabled,
            next_trigger: self.next_trigger,
            date_only: self.date_only,
            summary: self.summary.clone(),
        }
    }
}

/// Payload of an alarm that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub category: AlarmCategory,
    pub enabled: bool,
    pub next_trigger: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_only: bool,
    #[serde(default)]
    pub summary: String,
}

impl NewEvent {
    pub fn active(next_trigger: DateTime<Utc>, summary: impl Into<String>) -> Self {
        Self {
            category: AlarmCategory::Active,
            enabled: true,
            next_trigger: Some(next_trigger),
            date_only: false,
            summary: summary.into(),
        }
    }
}
