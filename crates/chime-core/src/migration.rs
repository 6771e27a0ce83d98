// ── Storage format migration ──
//
// Decides when a resource in an older storage format should be upgraded.
// Each resource is asked about at most once per engine lifetime unless an
// upgrade attempt fails; a declined upgrade is remembered on the resource
// itself through `keep_old_format`.

use std::collections::HashSet;

use tracing::debug;

use crate::collaborator::PromptAnswer;
use crate::model::{CollectionAttributes, FormatCompat, ResourceId, ResourceRecord};

/// What the engine should do after a resource's attributes were seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    None,
    Prompt,
    UpdateSilently,
}

/// Follow-up for an answered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerAction {
    /// Submit `UpdateStorageFormat`.
    Update,
    /// Persist `keep_old_format = true`.
    KeepOldFormat(CollectionAttributes),
    None,
}

#[derive(Debug, Default)]
pub struct FormatMigrationCoordinator {
    auto_update: bool,
    /// Resources already asked about during this run.
    prompted: HashSet<ResourceId>,
    /// Resources with a prompt or an update job outstanding.
    in_flight: HashSet<ResourceId>,
}

impl FormatMigrationCoordinator {
    pub fn new(auto_update: bool) -> Self {
        Self {
            auto_update,
            ..Self::default()
        }
    }

    /// React to a resource's current attributes.
    pub fn on_resource_state(&mut self, record: &ResourceRecord) -> MigrationAction {
        if record.format != FormatCompat::Convertible || record.keep_old_format {
            return MigrationAction::None;
        }
        if self.in_flight.contains(&record.id) || self.prompted.contains(&record.id) {
            return MigrationAction::None;
        }
        self.prompted.insert(record.id.clone());
        self.in_flight.insert(record.id.clone());
        if self.auto_update {
            debug!(resource = %record.id, "upgrading storage format without asking");
            MigrationAction::UpdateSilently
        } else {
            debug!(resource = %record.id, "asking about storage format upgrade");
            MigrationAction::Prompt
        }
    }

    /// Turn a prompt answer into the write it calls for.
    ///
    /// Answers for resources that vanished meanwhile are ignored.
    pub fn on_answer(&mut self, resource: &ResourceId, answer: PromptAnswer, still_exists: bool) -> AnswerAction {
        if !still_exists {
            self.in_flight.remove(resource);
            return AnswerAction::None;
        }
        match answer {
            PromptAnswer::Update => AnswerAction::Update,
            PromptAnswer::KeepOldFormat => {
                self.in_flight.remove(resource);
                AnswerAction::KeepOldFormat(CollectionAttributes {
                    keep_old_format: Some(true),
                    ..CollectionAttributes::default()
                })
            }
            PromptAnswer::Dismissed => {
                self.in_flight.remove(resource);
                AnswerAction::None
            }
        }
    }

    /// Record an update job's outcome. A failed resource may be asked about
    /// again the next time its attributes are seen.
    pub fn on_update_finished(&mut self, resource: &ResourceId, success: bool) {
        self.in_flight.remove(resource);
        if !success {
            self.prompted.remove(resource);
        }
    }

    pub fn forget(&mut self, resource: &ResourceId) {
        self.prompted.remove(resource);
        self.in_flight.remove(resource);
    }

    pub fn is_in_flight(&self, resource: &ResourceId) -> bool {
        self.in_flight.contains(resource)
    }
}
