//! Per-event change signals and the live aggregation consumer built on them.

use crate::{aggregation::Aggregation, backend::AvailabilityBackend};
use futures::{Stream, StreamExt};
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error};
use uuid::Uuid;

type Channels = Arc<Mutex<HashMap<Uuid, watch::Sender<u64>>>>;

/// Fans "something changed" signals out to the subscribers of one event.
#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier {
    channels: Channels,
}

impl ChangeNotifier {
    pub fn subscribe(&self, event_id: Uuid) -> Subscription {
        let receiver = self
            .channels
            .lock()
            .unwrap()
            .entry(event_id)
            .or_insert_with(|| watch::channel(0).0)
            .subscribe();
        debug!(%event_id, "Subscribed to availability changes");

        Subscription {
            event_id,
            stream: WatchStream::new(receiver),
            channels: self.channels.clone(),
        }
    }

    /// No-op while nobody watches the event.
    pub fn notify(&self, event_id: Uuid) {
        if let Some(sender) = self.channels.lock().unwrap().get(&event_id) {
            sender.send_modify(|version| *version = version.wrapping_add(1));
        }
    }

    pub fn subscriber_count(&self, event_id: Uuid) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(&event_id)
            .map_or(0, |sender| sender.receiver_count())
    }
}

/// Owned handle on one event's change signals.
///
/// The first poll yields right away so consumers can do their initial load.
/// Signals that arrive while the consumer is busy collapse into one.
/// Dropping the handle unsubscribes.
pub struct Subscription {
    event_id: Uuid,
    stream: WatchStream<u64>,
    channels: Channels,
}

impl Subscription {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = ();

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<()>> {
        self.stream.poll_next_unpin(cx).map(|item| item.map(|_| ()))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut channels = self.channels.lock().unwrap();
        // Our own receiver is still alive at this point.
        let last = channels
            .get(&self.event_id)
            .is_some_and(|sender| sender.receiver_count() <= 1);
        if last {
            channels.remove(&self.event_id);
        }
        debug!(event_id = %self.event_id, "Unsubscribed from availability changes");
    }
}

/// Keeps an [`Aggregation`] of one event current.
///
/// Every change signal triggers a re-fetch. A failed fetch keeps the previous
/// snapshot. Dropping the handle stops the task and releases the subscription.
pub struct LiveAggregation {
    snapshot: watch::Receiver<Aggregation>,
    task: JoinHandle<()>,
}

impl LiveAggregation {
    pub fn start<B: AvailabilityBackend>(backend: B, event_id: Uuid) -> Self {
        let mut subscription = backend.subscribe(event_id);
        let (sender, snapshot) = watch::channel(Aggregation::default());

        let task = tokio::spawn(async move {
            while subscription.next().await.is_some() {
                match Aggregation::fetch(&backend, event_id).await {
                    Ok(aggregation) => {
                        if sender.send(aggregation).is_err() {
                            break;
                        }
                    }
                    Err(err) => error!(%event_id, %err, "Failed to refresh aggregation"),
                }
            }
        });

        Self { snapshot, task }
    }

    pub fn current(&self) -> Aggregation {
        self.snapshot.borrow().clone()
    }

    /// Waits for the next recomputed snapshot. `None` once the task ended.
    pub async fn next(&mut self) -> Option<Aggregation> {
        self.snapshot.changed().await.ok()?;
        Some(self.snapshot.borrow_and_update().clone())
    }

    pub fn stop(self) {}
}

impl Drop for LiveAggregation {
    fn drop(&mut self) {
        self.task.abort();
    }
}
