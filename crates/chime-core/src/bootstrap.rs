// ── Resource bootstrap ──
//
// Makes sure every storable alarm category has somewhere to live. Legacy
// single-file calendars are converted into resources the first time the
// engine runs against an empty backend; any category still uncovered gets
// a default resource. Planning is pure; the engine drives the jobs.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{
    AlarmCategory, CategorySet, Colour, JobId, NewCollection, ResourceId, ResourceRecord, Rights,
};
use crate::policy;

/// A calendar from the pre-resource configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCalendar {
    pub name: String,
    pub category: AlarmCategory,
    /// File path; relative paths are taken from the data directory.
    pub location: String,
    pub enabled: bool,
    pub standard: bool,
    pub read_only: bool,
    pub colour: Option<Colour>,
}

/// Default file name and display name for a category's resource.
pub fn default_calendar(category: AlarmCategory) -> (&'static str, &'static str) {
    match category.storage_category() {
        AlarmCategory::Archived => ("expired.ics", "Archived Alarms"),
        AlarmCategory::Template => ("template.ics", "Alarm Templates"),
        _ => ("calendar.ics", "Active Alarms"),
    }
}

/// Resources that must be created to cover every category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapPlan {
    pub creations: Vec<NewCollection>,
    pub migrates_legacy: bool,
}

/// Plan bootstrap creations against the resources that already exist.
///
/// Legacy calendars are only migrated into an empty backend. Standard and
/// alias rules apply among the planned resources as they would to live
/// ones: a later legacy entry loses a standard flag or an enabled type
/// already claimed by an earlier one.
pub fn plan<'a>(
    existing: impl IntoIterator<Item = &'a ResourceRecord>,
    legacy: &[LegacyCalendar],
    data_dir: &Path,
) -> BootstrapPlan {
    let existing: Vec<&ResourceRecord> = existing.into_iter().collect();
    let mut covered = existing
        .iter()
        .fold(CategorySet::EMPTY, |acc, r| acc | r.supported_types);

    let mut planned: Vec<ResourceRecord> = Vec::new();
    let migrates_legacy = existing.is_empty() && !legacy.is_empty();
    if migrates_legacy {
        for entry in legacy {
            let record = plan_legacy(entry, planned.len(), &planned, data_dir);
            covered = covered | record.supported_types;
            planned.push(record);
        }
    }

    for category in AlarmCategory::STORABLE {
        if covered.contains(category) {
            continue;
        }
        let (file, name) = default_calendar(category);
        let types = CategorySet::single(category);
        let mut record = ResourceRecord::new(
            placeholder_id(planned.len()),
            name,
            resolve(data_dir, file),
            types,
        );
        record.enabled_types = types;
        record.standard_for = types;
        planned.push(record);
        covered = covered | types;
    }

    debug!(
        existing = existing.len(),
        planned = planned.len(),
        migrates_legacy,
        "bootstrap planned"
    );
    BootstrapPlan {
        creations: planned.into_iter().map(into_new_collection).collect(),
        migrates_legacy,
    }
}

fn plan_legacy(
    entry: &LegacyCalendar,
    index: usize,
    planned: &[ResourceRecord],
    data_dir: &Path,
) -> ResourceRecord {
    let types = CategorySet::single(entry.category.storage_category());
    let mut record = ResourceRecord::new(
        placeholder_id(index),
        entry.name.clone(),
        resolve(data_dir, &entry.location),
        types,
    );
    record.rights = if entry.read_only {
        Rights::CAN_READ
    } else {
        Rights::ALL
    };
    record.background_colour = entry.colour;
    if entry.enabled {
        record.enabled_types = policy::compute_enablable_types(&record, types, planned);
    }
    if entry.standard {
        let plan = policy::plan_standard(&record, types, std::iter::empty());
        let taken = planned
            .iter()
            .fold(CategorySet::EMPTY, |acc, r| acc | r.standard_for);
        record.standard_for = plan.granted - taken;
    }
    record
}

fn placeholder_id(index: usize) -> ResourceId {
    ResourceId::new(format!("planned-{index}"))
}

fn resolve(data_dir: &Path, location: &str) -> String {
    let path = Path::new(location);
    if path.is_absolute() || location.contains("://") {
        location.to_owned()
    } else {
        data_dir.join(path).to_string_lossy().into_owned()
    }
}

fn into_new_collection(record: ResourceRecord) -> NewCollection {
    NewCollection {
        name: record.name,
        location: record.location,
        supported_types: record.supported_types,
        enabled_types: record.enabled_types,
        standard_for: record.standard_for,
        rights: record.rights,
        background_colour: record.background_colour,
    }
}

// ── Run tracking ────────────────────────────────────────────────────

/// A resource that could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of one bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub created: Vec<ResourceId>,
    pub failed: Vec<BootstrapFailure>,
    pub migrated_legacy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Fetching { job: JobId, attempt: u32 },
    WaitingRetry { attempt: u32 },
    Creating,
}

/// Progress of the bootstrap run currently in flight.
#[derive(Debug)]
pub(crate) struct Bootstrapper {
    phase: Phase,
    creations: HashMap<JobId, String>,
    report: BootstrapReport,
    completed: bool,
}

impl Bootstrapper {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            creations: HashMap::new(),
            report: BootstrapReport::default(),
            completed: false,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Whether at least one run has finished.
    pub(crate) fn has_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn fetching(&mut self, job: JobId, attempt: u32) {
        if attempt == 1 {
            self.report = BootstrapReport::default();
        }
        self.phase = Phase::Fetching { job, attempt };
    }

    /// The attempt number of the fetch `job`, if it is ours.
    pub(crate) fn fetch_attempt(&self, job: JobId) -> Option<u32> {
        match self.phase {
            Phase::Fetching { job: current, attempt } if current == job => Some(attempt),
            _ => None,
        }
    }

    pub(crate) fn waiting_retry(&mut self, attempt: u32) {
        self.phase = Phase::WaitingRetry { attempt };
    }

    pub(crate) fn creating(&mut self, jobs: Vec<(JobId, String)>, migrated_legacy: bool) {
        self.report.migrated_legacy = migrated_legacy;
        self.creations = jobs.into_iter().collect();
        self.phase = Phase::Creating;
    }

    pub(crate) fn owns_creation(&self, job: JobId) -> bool {
        self.creations.contains_key(&job)
    }

    /// Record a creation job's outcome, returning the failure if it failed.
    pub(crate) fn creation_finished(
        &mut self,
        job: JobId,
        result: Result<ResourceId, String>,
    ) -> Option<BootstrapFailure> {
        let name = self.creations.remove(&job)?;
        match result {
            Ok(id) => {
                self.report.created.push(id);
                None
            }
            Err(error) => {
                let failure = BootstrapFailure { name, error };
                self.report.failed.push(failure.clone());
                Some(failure)
            }
        }
    }

    /// Whether every creation job of the current run has resolved.
    pub(crate) fn creations_done(&self) -> bool {
        self.phase == Phase::Creating && self.creations.is_empty()
    }

    /// End the run and hand back its report.
    pub(crate) fn finish(&mut self) -> BootstrapReport {
        self.phase = Phase::Idle;
        self.completed = true;
        self.creations.clear();
        std::mem::take(&mut self.report)
    }

    /// Abandon the run without marking it complete.
    pub(crate) fn abort(&mut self) {
        self.phase = Phase::Idle;
        self.creations.clear();
        self.report = BootstrapReport::default();
    }
}
