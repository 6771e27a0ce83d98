// ── Earliest-trigger cache ──
//
// Remembers, per resource, which active alarm fires next. Recomputed on
// demand when an index mutation touches a relevant field; never driven by
// the clock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{AlarmCategory, EventId, EventRecord, ResourceId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Winner {
    event: EventId,
    trigger: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct EarliestTriggerCache {
    winners: HashMap<ResourceId, Winner>,
}

impl EarliestTriggerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rescan one resource's events. Returns `true` if the winning event
    /// changed identity.
    ///
    /// Equal trigger times are ordered by event id.
    pub fn recompute<'a>(
        &mut self,
        resource: &ResourceId,
        events: impl IntoIterator<Item = &'a EventRecord>,
    ) -> bool {
        let best = events
            .into_iter()
            .filter(|e| e.is_trigger_candidate())
            .filter_map(|e| e.next_trigger.map(|t| (t, &e.id)))
            .min()
            .map(|(trigger, event)| Winner {
                event: event.clone(),
                trigger,
            });

        let previous = match best {
            Some(winner) => self.winners.insert(resource.clone(), winner),
            None => self.winners.remove(resource),
        };
        let current = self.winners.get(resource).map(|w| &w.event);
        previous.as_ref().map(|w| &w.event) != current
    }

    pub fn get(&self, resource: &ResourceId) -> Option<&EventId> {
        self.winners.get(resource).map(|w| &w.event)
    }

    /// Soonest cached winner over all resources accepted by `eligible`.
    ///
    /// Looks at one cached value per resource, never at events.
    pub fn global_earliest(
        &self,
        eligible: impl Fn(&ResourceId) -> bool,
    ) -> Option<(ResourceId, EventId)> {
        self.winners
            .iter()
            .filter(|(resource, _)| eligible(resource))
            .min_by(|(ra, a), (rb, b)| {
                (a.trigger, &a.event, *ra).cmp(&(b.trigger, &b.event, *rb))
            })
            .map(|(resource, w)| (resource.clone(), w.event.clone()))
    }

    /// Drop a resource's entry. Returns `true` if it had a winner.
    pub fn forget(&mut self, resource: &ResourceId) -> bool {
        self.winners.remove(resource).is_some()
    }
}

/// Whether replacing `old` with `new` can move a resource's earliest trigger.
pub fn affects_earliest(old: Option<&EventRecord>, new: Option<&EventRecord>) -> bool {
    let relevant = |e: &EventRecord| e.category == AlarmCategory::Active;
    match (old, new) {
        (None, None) => false,
        (Some(e), None) | (None, Some(e)) => relevant(e),
        (Some(a), Some(b)) => {
            (relevant(a) || relevant(b))
                && (a.category != b.category
                    || a.enabled != b.enabled
                    || a.next_trigger != b.next_trigger
                    || a.pending != b.pending)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::NewEvent;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn active(id: &str, secs: i64) -> EventRecord {
        EventRecord::new(
            EventId::from(id),
            ResourceId::from("r1"),
            NewEvent::active(at(secs), id),
        )
    }

    #[test]
    fn pending_events_are_skipped() {
        let r = ResourceId::from("r1");
        let e1 = active("e1", 100);
        let mut e2 = active("e2", 50);
        e2.pending = true;

        let mut cache = EarliestTriggerCache::new();
        assert!(cache.recompute(&r, [&e1, &e2]));
        assert_eq!(cache.get(&r), Some(&EventId::from("e1")));

        e2.pending = false;
        assert!(cache.recompute(&r, [&e1, &e2]));
        assert_eq!(cache.get(&r), Some(&EventId::from("e2")));
    }

    #[test]
    fn unchanged_winner_reports_no_change() {
        let r = ResourceId::from("r1");
        let e1 = active("e1", 100);
        let mut e2 = active("e2", 200);

        let mut cache = EarliestTriggerCache::new();
        cache.recompute(&r, [&e1, &e2]);
        e2.next_trigger = Some(at(150));
        assert!(!cache.recompute(&r, [&e1, &e2]));
    }

    #[test]
    fn ties_are_broken_by_event_id() {
        let r = ResourceId::from("r1");
        let b = active("b", 100);
        let a = active("a", 100);

        let mut cache = EarliestTriggerCache::new();
        cache.recompute(&r, [&b, &a]);
        assert_eq!(cache.get(&r), Some(&EventId::from("a")));
    }

    #[test]
    fn disabled_and_untriggered_events_are_ignored() {
        let r = ResourceId::from("r1");
        let mut off = active("off", 10);
        off.enabled = false;
        let mut never = active("never", 20);
        never.next_trigger = None;

        let mut cache = EarliestTriggerCache::new();
        assert!(!cache.recompute(&r, [&off, &never]));
        assert_eq!(cache.get(&r), None);
    }

    #[test]
    fn global_earliest_uses_cached_winners() {
        let mut cache = EarliestTriggerCache::new();
        let r1 = ResourceId::from("r1");
        let r2 = ResourceId::from("r2");
        cache.recompute(&r1, [&active("x", 300)]);
        cache.recompute(&r2, [&active("y", 200)]);

        assert_eq!(
            cache.global_earliest(|_| true),
            Some((r2.clone(), EventId::from("y")))
        );
        assert_eq!(
            cache.global_earliest(|r| *r != r2),
            Some((r1, EventId::from("x")))
        );
    }

    #[test]
    fn summary_edits_do_not_affect_earliest() {
        let a = active("e", 10);
        let mut b = a.clone();
        b.summary = "changed".into();
        assert!(!affects_earliest(Some(&a), Some(&b)));
        b.enabled = false;
        assert!(affects_earliest(Some(&a), Some(&b)));
    }
}
