// Integration tests for command handling against the in-memory backend.
//
// Each test drives a real engine task through `AlarmController` and checks
// the store, the backend and the notification stream afterwards.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use chime_core::{
    AlarmCategory, AlarmNotification, CategorySet, Colour, Command, CommandResult, CoreError,
    EngineConfig, EventId, EventRecord, FormatCompat, JobKind, NewEvent, PromptAnswer, ResourceId,
    Rights,
};
use common::{active, bootstrapped, collection, standard_holders, start, start_with, wait_for};

// ── Helpers ─────────────────────────────────────────────────────────

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
}

async fn add(
    controller: &chime_core::AlarmController,
    resource: Option<ResourceId>,
    event: NewEvent,
) -> Result<(ResourceId, EventId), CoreError> {
    match controller.execute(Command::AddEvent { resource, event }).await? {
        CommandResult::EventAdded { resource, id } => Ok((resource, id)),
        other => panic!("expected EventAdded, got: {other:?}"),
    }
}

fn active_standard(controller: &chime_core::AlarmController) -> ResourceId {
    controller
        .standard_resource(AlarmCategory::Active, false)
        .unwrap()
}

/// Earliest candidate computed from scratch over a resource's events.
fn brute_force_earliest(events: &[EventRecord]) -> Option<EventId> {
    events
        .iter()
        .filter(|e| e.is_trigger_candidate())
        .min_by(|a, b| (a.next_trigger, &a.id).cmp(&(b.next_trigger, &b.id)))
        .map(|e| e.id.clone())
}

// ── Event commands ──────────────────────────────────────────────────

#[tokio::test]
async fn test_add_event_goes_to_standard_resource() {
    let h = bootstrapped().await;
    let standard = active_standard(&h.controller);

    let (resource, id) = add(&h.controller, None, NewEvent::active(at(9, 0), "standup"))
        .await
        .unwrap();
    assert_eq!(resource, standard);

    // The reply is sent after the backend reported the new item.
    let event = h.controller.event(&resource, &id).unwrap();
    assert_eq!(event.summary, "standup");
    assert_eq!(h.backend.items(&resource).len(), 1);
}

#[tokio::test]
async fn test_add_event_without_any_resource_fails() {
    let h = start().await;

    let result = add(&h.controller, None, NewEvent::active(at(9, 0), "lost")).await;
    assert!(
        matches!(result, Err(CoreError::NoStandardResource { .. })),
        "expected NoStandardResource, got: {result:?}"
    );
    assert_eq!(h.backend.submitted(JobKind::CreateItem), 0);
}

#[tokio::test]
async fn test_add_event_refused_by_resource_state() {
    let mut read_only = collection("ro", "/ro.ics", active());
    read_only.rights = Rights::CAN_READ;
    let h = start_with(EngineConfig::default(), PromptAnswer::Dismissed, |backend| {
        backend.insert_collection(read_only);
        let old = backend.insert_collection(collection("old", "/old.ics", active()));
        backend.edit_collection(&old, |r| r.format = FormatCompat::Incompatible);
        backend.insert_collection(collection(
            "archive",
            "/archive.ics",
            CategorySet::single(AlarmCategory::Archived),
        ));
    })
    .await;
    h.controller.flush().await.unwrap();

    let event = || NewEvent::active(at(9, 0), "refused");

    let result = add(&h.controller, Some(ResourceId::from("col-1")), event()).await;
    assert!(
        matches!(result, Err(CoreError::ReadOnly { .. })),
        "expected ReadOnly, got: {result:?}"
    );

    let result = add(&h.controller, Some(ResourceId::from("col-2")), event()).await;
    assert!(
        matches!(result, Err(CoreError::FormatIncompatible { .. })),
        "expected FormatIncompatible, got: {result:?}"
    );

    let result = add(&h.controller, Some(ResourceId::from("col-3")), event()).await;
    assert!(
        matches!(result, Err(CoreError::UnsupportedCategory { .. })),
        "expected UnsupportedCategory, got: {result:?}"
    );

    let result = add(&h.controller, Some(ResourceId::from("missing")), event()).await;
    assert!(
        matches!(result, Err(CoreError::ResourceNotFound { .. })),
        "expected ResourceNotFound, got: {result:?}"
    );

    assert_eq!(h.backend.submitted(JobKind::CreateItem), 0);
}

#[tokio::test]
async fn test_update_event_replaces_cached_copy() {
    let h = bootstrapped().await;
    let (resource, id) = add(&h.controller, None, NewEvent::active(at(9, 0), "before"))
        .await
        .unwrap();

    let mut event = h.controller.event(&resource, &id).unwrap();
    event.summary = "after".into();
    event.next_trigger = Some(at(11, 0));
    let result = h.controller.execute(Command::UpdateEvent { event }).await;
    assert_eq!(result.unwrap(), CommandResult::Ok);

    let cached = h.controller.event(&resource, &id).unwrap();
    assert_eq!(cached.summary, "after");
    assert_eq!(cached.next_trigger, Some(at(11, 0)));
}

#[tokio::test]
async fn test_update_unknown_event_fails() {
    let h = bootstrapped().await;
    let resource = active_standard(&h.controller);
    let event = EventRecord::new(
        EventId::from("ghost"),
        resource,
        NewEvent::active(at(9, 0), "ghost"),
    );

    let result = h.controller.execute(Command::UpdateEvent { event }).await;
    assert!(
        matches!(result, Err(CoreError::EventNotFound { .. })),
        "expected EventNotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn test_delete_event_and_missing_event_noop() {
    let mut h = bootstrapped().await;
    let (resource, id) = add(&h.controller, None, NewEvent::active(at(9, 0), "gone"))
        .await
        .unwrap();

    let result = h
        .controller
        .execute(Command::DeleteEvent {
            resource: resource.clone(),
            id: id.clone(),
        })
        .await;
    assert_eq!(result.unwrap(), CommandResult::Ok);
    assert!(h.controller.event(&resource, &id).is_none());

    wait_for(&mut h.notifications, |n| {
        matches!(
            n,
            AlarmNotification::EventAboutToBeRemoved { resource: r, event } if *r == resource && event.id == id
        )
    })
    .await;

    // Deleting it again is not an error and submits nothing.
    let before = h.backend.submitted(JobKind::DeleteItem);
    let result = h
        .controller
        .execute(Command::DeleteEvent { resource, id })
        .await;
    assert_eq!(result.unwrap(), CommandResult::Ok);
    assert_eq!(h.backend.submitted(JobKind::DeleteItem), before);
}

#[tokio::test]
async fn test_set_pending_unknown_event_fails() {
    let h = bootstrapped().await;
    let resource = active_standard(&h.controller);

    let result = h
        .controller
        .execute(Command::SetPending {
            resource,
            id: EventId::from("nope"),
            pending: true,
        })
        .await;
    assert!(
        matches!(result, Err(CoreError::EventNotFound { .. })),
        "expected EventNotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn test_item_of_unsupported_category_is_not_indexed() {
    let h = bootstrapped().await;
    let archived = h
        .controller
        .standard_resource(AlarmCategory::Archived, false)
        .unwrap();

    h.backend
        .insert_item(&archived, NewEvent::active(at(9, 0), "misplaced"))
        .unwrap();
    h.controller.flush().await.unwrap();

    assert!(h.controller.events_of(&archived, None).is_empty());
}

// ── Earliest trigger ────────────────────────────────────────────────

#[tokio::test]
async fn test_pending_flag_moves_earliest_trigger() {
    let mut h = bootstrapped().await;
    let resource = active_standard(&h.controller);

    let (_, later) = add(&h.controller, None, NewEvent::active(at(10, 0), "later"))
        .await
        .unwrap();
    let (_, sooner) = add(&h.controller, None, NewEvent::active(at(9, 0), "sooner"))
        .await
        .unwrap();
    assert_eq!(h.controller.earliest_trigger(&resource).unwrap().id, sooner);

    let set = |pending| Command::SetPending {
        resource: resource.clone(),
        id: sooner.clone(),
        pending,
    };

    h.controller.execute(set(true)).await.unwrap();
    assert_eq!(h.controller.earliest_trigger(&resource).unwrap().id, later);
    wait_for(&mut h.notifications, |n| {
        *n == AlarmNotification::EarliestTriggerChanged(resource.clone())
    })
    .await;

    h.controller.execute(set(false)).await.unwrap();
    assert_eq!(h.controller.earliest_trigger(&resource).unwrap().id, sooner);
    assert_eq!(h.controller.global_earliest_trigger().unwrap().id, sooner);
}

#[tokio::test]
async fn test_disabled_resource_is_skipped_globally() {
    let h = bootstrapped().await;
    let standard = active_standard(&h.controller);
    let other = h
        .backend
        .insert_collection(collection("other", "/other.ics", active()));
    h.controller.flush().await.unwrap();

    add(&h.controller, Some(standard.clone()), NewEvent::active(at(10, 0), "kept"))
        .await
        .unwrap();
    let (_, sooner) = add(&h.controller, Some(other.clone()), NewEvent::active(at(8, 0), "muted"))
        .await
        .unwrap();
    assert_eq!(h.controller.global_earliest_trigger().unwrap().id, sooner);

    let result = h
        .controller
        .execute(Command::SetResourceEnabled {
            resource: other.clone(),
            category: AlarmCategory::Active,
            enabled: false,
        })
        .await
        .unwrap();
    assert_eq!(
        result,
        CommandResult::TypesGranted {
            requested: CategorySet::EMPTY,
            granted: CategorySet::EMPTY,
        }
    );

    // The per-resource answer stays; only the global one skips it.
    assert_eq!(h.controller.earliest_trigger(&other).unwrap().id, sooner);
    assert_eq!(h.controller.global_earliest_trigger().unwrap().summary, "kept");
}

#[tokio::test]
async fn test_earliest_trigger_matches_brute_force() {
    let h = bootstrapped().await;
    let resource = active_standard(&h.controller);
    let base = at(0, 0);

    // Deterministic pseudo-random walk over adds, edits, pending toggles
    // and deletes.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move |bound: u64| {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed % bound
    };

    for step in 0..120 {
        let events = h.controller.events_of(&resource, None);
        let len = u64::try_from(events.len()).unwrap();
        let pick = |n: u64| events.get(usize::try_from(n).unwrap()).cloned();
        match next(5) {
            0 | 1 => {
                let mut event = NewEvent::active(
                    base + Duration::minutes(i64::try_from(next(50)).unwrap()),
                    format!("event {step}"),
                );
                event.enabled = next(4) != 0;
                if next(6) == 0 {
                    event.next_trigger = None;
                }
                add(&h.controller, None, event).await.unwrap();
            }
            2 if !events.is_empty() => {
                let event = pick(next(len)).unwrap();
                h.controller
                    .execute(Command::SetPending {
                        resource: resource.clone(),
                        id: event.id,
                        pending: !event.pending,
                    })
                    .await
                    .unwrap();
            }
            3 if !events.is_empty() => {
                let mut event = pick(next(len)).unwrap();
                event.next_trigger =
                    Some(base + Duration::minutes(i64::try_from(next(50)).unwrap()));
                h.controller
                    .execute(Command::UpdateEvent { event })
                    .await
                    .unwrap();
            }
            4 if !events.is_empty() => {
                let event = pick(next(len)).unwrap();
                h.controller
                    .execute(Command::DeleteEvent {
                        resource: resource.clone(),
                        id: event.id,
                    })
                    .await
                    .unwrap();
            }
            _ => continue,
        }

        h.controller.with_store(|store| {
            let events: Vec<EventRecord> = store.events_of(&resource, None).cloned().collect();
            let cached = store.earliest_trigger(&resource).map(|e| e.id.clone());
            assert_eq!(cached, brute_force_earliest(&events), "step {step}");
        });
    }
}

// ── Resource commands ───────────────────────────────────────────────

#[tokio::test]
async fn test_alias_enable_requests_back_to_back() {
    let h = start_with(EngineConfig::default(), PromptAnswer::Dismissed, |backend| {
        for name in ["first", "second"] {
            let mut new = collection(name, "/shared/alarms.ics", active());
            new.enabled_types = CategorySet::EMPTY;
            backend.insert_collection(new);
        }
    })
    .await;
    h.controller.flush().await.unwrap();
    let first = ResourceId::from("col-1");
    let second = ResourceId::from("col-2");

    let enable = |resource: &ResourceId| Command::SetResourceEnabled {
        resource: resource.clone(),
        category: AlarmCategory::Active,
        enabled: true,
    };

    // Neither write is confirmed when the second request is planned.
    h.backend.hold_jobs();
    let pending_first = h.controller.submit(enable(&first)).await.unwrap();
    let pending_second = h.controller.submit(enable(&second)).await.unwrap();

    assert_eq!(
        pending_second.wait().await.unwrap(),
        CommandResult::TypesGranted {
            requested: active(),
            granted: CategorySet::EMPTY,
        }
    );
    h.backend.release();
    assert_eq!(
        pending_first.wait().await.unwrap(),
        CommandResult::TypesGranted {
            requested: active(),
            granted: active(),
        }
    );

    h.controller.flush().await.unwrap();
    assert_eq!(h.controller.resource(&first).unwrap().enabled_types, active());
    assert_eq!(
        h.controller.resource(&second).unwrap().enabled_types,
        CategorySet::EMPTY
    );
    assert_eq!(
        h.backend.collection(&second).unwrap().enabled_types,
        CategorySet::EMPTY
    );
}

#[tokio::test]
async fn test_disabling_clears_standard_flag() {
    let h = bootstrapped().await;
    let resource = active_standard(&h.controller);

    let result = h
        .controller
        .execute(Command::SetResourceEnabled {
            resource: resource.clone(),
            category: AlarmCategory::Active,
            enabled: false,
        })
        .await
        .unwrap();
    assert_eq!(
        result,
        CommandResult::TypesGranted {
            requested: CategorySet::EMPTY,
            granted: CategorySet::EMPTY,
        }
    );

    let record = h.controller.resource(&resource).unwrap();
    assert!(record.enabled_types.is_empty());
    assert!(record.standard_for.is_empty());
    assert!(h.controller.standard_resource(AlarmCategory::Active, false).is_none());
}

#[tokio::test]
async fn test_standard_is_unique_per_category() {
    let mut h = bootstrapped().await;
    let old = active_standard(&h.controller);
    let new = h
        .backend
        .insert_collection(collection("work", "/work.ics", active()));
    h.controller.flush().await.unwrap();

    let result = h
        .controller
        .execute(Command::SetResourceStandard {
            resource: new.clone(),
            categories: active(),
        })
        .await
        .unwrap();
    assert_eq!(
        result,
        CommandResult::StandardGranted {
            requested: active(),
            granted: active(),
        }
    );

    let resources = h.controller.resources();
    assert_eq!(standard_holders(&resources, AlarmCategory::Active), vec![new.clone()]);
    assert!(h.controller.resource(&old).unwrap().standard_for.is_empty());

    wait_for(&mut h.notifications, |n| {
        matches!(
            n,
            AlarmNotification::ResourceStatusChanged { resource, .. } if *resource == new
        )
    })
    .await;
}

#[tokio::test]
async fn test_standard_request_limited_to_enabled_types() {
    let h = bootstrapped().await;
    let mut new = collection("both", "/both.ics", CategorySet::STORABLE);
    new.enabled_types = active();
    let id = h.backend.insert_collection(new);
    h.controller.flush().await.unwrap();

    let requested = active() | CategorySet::single(AlarmCategory::Template);
    let result = h
        .controller
        .execute(Command::SetResourceStandard {
            resource: id.clone(),
            categories: requested,
        })
        .await
        .unwrap();
    assert_eq!(
        result,
        CommandResult::StandardGranted {
            requested,
            granted: active(),
        }
    );
    assert_eq!(
        standard_holders(&h.controller.resources(), AlarmCategory::Template).len(),
        1
    );
}

#[tokio::test]
async fn test_standard_change_partial_failure_is_not_rolled_back() {
    let h = bootstrapped().await;
    let old = active_standard(&h.controller);
    let new = h
        .backend
        .insert_collection(collection("work", "/work.ics", active()));
    h.controller.flush().await.unwrap();

    // The first attribute write is the one clearing the old standard.
    h.backend.fail_next(JobKind::ModifyCollectionAttributes, 1);
    let result = h
        .controller
        .execute(Command::SetResourceStandard {
            resource: new.clone(),
            categories: active(),
        })
        .await;
    assert!(
        matches!(result, Err(CoreError::BackendJobFailed { .. })),
        "expected BackendJobFailed, got: {result:?}"
    );

    // The confirmed half is applied; the failed half is reported.
    assert_eq!(h.controller.resource(&new).unwrap().standard_for, active());
    assert_eq!(h.controller.resource(&old).unwrap().standard_for, active());
    let reports = h.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].resource, Some(new));
}

#[tokio::test]
async fn test_background_colour_round_trips_through_backend() {
    let mut h = bootstrapped().await;
    let resource = active_standard(&h.controller);
    let colour = Colour::new(0x12, 0x34, 0x56);

    let result = h
        .controller
        .execute(Command::SetBackgroundColour {
            resource: resource.clone(),
            colour: Some(colour),
        })
        .await;
    assert_eq!(result.unwrap(), CommandResult::Ok);

    assert_eq!(
        h.controller.resource(&resource).unwrap().background_colour,
        Some(colour)
    );
    wait_for(&mut h.notifications, |n| {
        matches!(
            n,
            AlarmNotification::ResourceStatusChanged {
                change: chime_core::StatusChange::Colour(Some(c)),
                ..
            } if *c == colour
        )
    })
    .await;
}

#[tokio::test]
async fn test_removing_resource_leaves_no_events_behind() {
    let mut h = bootstrapped().await;
    let resource = active_standard(&h.controller);
    let (_, first) = add(&h.controller, None, NewEvent::active(at(9, 0), "one"))
        .await
        .unwrap();
    add(&h.controller, None, NewEvent::active(at(10, 0), "two"))
        .await
        .unwrap();

    let result = h
        .controller
        .execute(Command::RemoveResource {
            resource: resource.clone(),
        })
        .await;
    assert_eq!(result.unwrap(), CommandResult::Ok);

    assert!(h.controller.resource(&resource).is_none());
    assert!(h.controller.events_of(&resource, None).is_empty());
    assert!(h.controller.earliest_trigger(&resource).is_none());
    assert_eq!(h.controller.event_by_global_id(&first).unwrap(), None);

    // Removal announcements precede the resource's own.
    let mut about_to_be_removed = 0;
    loop {
        let notification = wait_for(&mut h.notifications, |n| {
            matches!(
                n,
                AlarmNotification::EventAboutToBeRemoved { .. } | AlarmNotification::ResourceRemoved(_)
            )
        })
        .await;
        match notification {
            AlarmNotification::EventAboutToBeRemoved { .. } => about_to_be_removed += 1,
            _ => break,
        }
    }
    assert_eq!(about_to_be_removed, 2);
}

#[tokio::test]
async fn test_external_collection_removal_purges_events() {
    let h = bootstrapped().await;
    let resource = active_standard(&h.controller);
    add(&h.controller, None, NewEvent::active(at(9, 0), "one"))
        .await
        .unwrap();

    assert!(h.backend.remove_collection(&resource));
    h.controller.flush().await.unwrap();

    assert!(h.controller.resource(&resource).is_none());
    h.controller.with_store(|store| assert_eq!(store.event_count(), 0));
}

#[tokio::test]
async fn test_synchronize_resource_refreshes_cache() {
    let h = bootstrapped().await;
    let resource = active_standard(&h.controller);
    h.backend
        .insert_item(&resource, NewEvent::active(at(9, 0), "seen"))
        .unwrap();
    h.controller.flush().await.unwrap();
    assert!(h.controller.with_store(|s| s.last_synced(&resource)).is_none());

    let result = h
        .controller
        .execute(Command::SynchronizeResource {
            resource: resource.clone(),
        })
        .await;
    assert_eq!(result.unwrap(), CommandResult::Ok);

    assert_eq!(h.controller.events_of(&resource, None).len(), 1);
    assert!(h.controller.with_store(|s| s.last_synced(&resource)).is_some());
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_after_shutdown_fail() {
    let h = start().await;
    h.controller.shutdown().await;

    let result = h.controller.flush().await;
    assert!(
        matches!(result, Err(CoreError::EngineStopped)),
        "expected EngineStopped, got: {result:?}"
    );
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let h = start().await;
    h.controller.start().await.unwrap();
    tokio_test::assert_ok!(h.controller.flush().await);
}
