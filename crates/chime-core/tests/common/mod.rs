// Shared harness for engine integration tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chime_core::{
    AlarmCategory, AlarmController, AlarmNotification, CategorySet, Collaborators, EngineConfig,
    ErrorReporter, FormatPrompter, MemoryBackend, NewCollection, NotificationStream, PromptAnswer,
    ResourceId, ResourceRecord, Rights,
};
use futures_util::future::{self, BoxFuture};
use tokio_stream::StreamExt;

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub backend: MemoryBackend,
    pub controller: AlarmController,
    pub reporter: Arc<RecordingReporter>,
    pub prompter: Arc<RecordingPrompter>,
    pub notifications: NotificationStream,
}

/// Build a started engine over `backend` after `seed` has run against it.
pub async fn start_with(
    config: EngineConfig,
    answer: PromptAnswer,
    seed: impl FnOnce(&MemoryBackend),
) -> Harness {
    let (backend, events) = MemoryBackend::new();
    seed(&backend);
    start_on(backend, events, config, answer).await
}

pub async fn start_on(
    backend: MemoryBackend,
    events: tokio::sync::mpsc::UnboundedReceiver<chime_core::BackendEvent>,
    config: EngineConfig,
    answer: PromptAnswer,
) -> Harness {
    let reporter = Arc::new(RecordingReporter::default());
    let prompter = Arc::new(RecordingPrompter::new(answer));
    let collaborators = Collaborators {
        reporter: reporter.clone(),
        prompter: prompter.clone(),
    };
    let controller = AlarmController::new(config, Arc::new(backend.clone()), events, collaborators);
    let notifications = controller.notifications();
    controller.start().await.unwrap();
    Harness {
        backend,
        controller,
        reporter,
        prompter,
        notifications,
    }
}

pub async fn start() -> Harness {
    start_with(EngineConfig::default(), PromptAnswer::Dismissed, |_| {}).await
}

/// A started engine that has already created the three default resources.
pub async fn bootstrapped() -> Harness {
    let harness = start().await;
    let report = harness.controller.bootstrap().await.unwrap();
    assert_eq!(report.created.len(), 3);
    harness
}

pub fn fast_retry(limit: u32) -> EngineConfig {
    EngineConfig {
        bootstrap_retry_limit: limit,
        bootstrap_retry_interval: Duration::from_millis(1),
        ..EngineConfig::default()
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn collection(name: &str, location: &str, supported: CategorySet) -> NewCollection {
    NewCollection {
        name: name.into(),
        location: location.into(),
        supported_types: supported,
        enabled_types: supported,
        standard_for: CategorySet::EMPTY,
        rights: Rights::ALL,
        background_colour: None,
    }
}

pub fn active() -> CategorySet {
    CategorySet::single(AlarmCategory::Active)
}

pub fn standard_holders(resources: &[ResourceRecord], category: AlarmCategory) -> Vec<ResourceId> {
    resources
        .iter()
        .filter(|r| r.standard_for.contains(category))
        .map(|r| r.id.clone())
        .collect()
}

// ── Notification helpers ────────────────────────────────────────────

/// Read notifications until one matches, failing after a few seconds.
pub async fn wait_for(
    stream: &mut NotificationStream,
    matches: impl Fn(&AlarmNotification) -> bool,
) -> AlarmNotification {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(notification) = stream.next().await {
            if matches(&notification) {
                return notification;
            }
        }
        panic!("notification stream closed");
    })
    .await
    .unwrap()
}

/// Poll `condition`, flushing the engine between attempts.
pub async fn eventually(controller: &AlarmController, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        controller.flush().await.unwrap();
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

// ── Recording collaborators ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reported {
    pub resource: Option<ResourceId>,
    pub message: String,
    pub details: String,
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Reported>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Reported> {
        self.reports.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report_resource_error(&self, resource: Option<&ResourceId>, message: &str, details: &str) {
        self.reports.lock().unwrap().push(Reported {
            resource: resource.cloned(),
            message: message.to_owned(),
            details: details.to_owned(),
        });
    }
}

#[derive(Debug)]
pub struct RecordingPrompter {
    answer: PromptAnswer,
    asked: AtomicUsize,
}

impl RecordingPrompter {
    pub fn new(answer: PromptAnswer) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl FormatPrompter for RecordingPrompter {
    fn confirm_update(&self, _resource: &ResourceRecord) -> BoxFuture<'static, PromptAnswer> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Box::pin(future::ready(self.answer))
    }
}
