// ── Change notifications ──
//
// Everything observers learn about the engine arrives as an
// `AlarmNotification` on a broadcast channel. Notifications queued during
// one engine step are published together after the store lock is released.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::model::{CategorySet, Colour, EventRecord, FormatCompat, ResourceId, ResourceRecord};

/// Which observable attribute of a resource changed, with its new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Enabled(CategorySet),
    ReadOnly(bool),
    AlarmTypes(CategorySet),
    Standard(CategorySet),
    Format(FormatCompat),
    KeepOldFormat(bool),
    Colour(Option<Colour>),
    Name(String),
    Location(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmNotification {
    EventAdded {
        resource: ResourceId,
        event: EventRecord,
    },
    EventChanged {
        resource: ResourceId,
        event: EventRecord,
    },
    /// Published before the event leaves the index.
    EventAboutToBeRemoved {
        resource: ResourceId,
        event: EventRecord,
    },
    ResourceAdded(ResourceRecord),
    ResourceRemoved(ResourceId),
    ResourceStatusChanged {
        resource: ResourceId,
        change: StatusChange,
    },
    /// The earliest-trigger winner of this resource changed identity, or
    /// its eligibility for the global earliest changed.
    EarliestTriggerChanged(ResourceId),
    MigrationCompleted {
        created: usize,
        failed: usize,
    },
}

/// A live subscription to engine notifications.
///
/// Lagging subscribers skip what they missed and keep receiving.
pub struct NotificationStream {
    inner: BroadcastStream<AlarmNotification>,
}

impl NotificationStream {
    pub(crate) fn new(receiver: broadcast::Receiver<AlarmNotification>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for NotificationStream {
    type Item = AlarmNotification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(notification))) => return Poll::Ready(Some(notification)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "notification subscriber lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
