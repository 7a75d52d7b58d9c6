//! Subscription hub: fans progress events out to per-request observers.
//!
//! The hub decouples the executor (producer) from transport-specific
//! delivery (consumer): an observer is just the receiving end of a bounded
//! channel, and the connection layer drains it however it likes.
//!
//! Sequence numbers are stamped here, not by the emitter. Cancellation of a
//! queued request is published by the cancelling caller rather than the
//! owning worker, so a single per-request allocator inside the hub is what
//! makes the per-request order total by construction.
//!
//! Delivery policy: at-least-once per connected observer. A slow observer
//! never blocks the publishing worker; non-terminal events to a full
//! observer channel are dropped (the replay buffer and `get_status` cover
//! the gap), while terminal events fall back to an awaited send on a
//! separate task so they are never dropped for a reachable observer.

use pg_protocol::events::{ProgressEvent, ProgressEventKind};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifies one observer registration; pass back to [`SubscriptionHub::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    request_id: Uuid,
    observer_id: u64,
}

/// A live subscription: the handle plus the event receiving end.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::Receiver<ProgressEvent>,
}

struct Observer {
    id: u64,
    tx: mpsc::Sender<ProgressEvent>,
}

#[derive(Default)]
struct RequestChannel {
    observers: Vec<Observer>,
    replay: VecDeque<ProgressEvent>,
    next_sequence: u64,
    terminated: bool,
}

/// Publish/subscribe registry keyed by request id, with a bounded replay
/// buffer per request for late or reconnecting subscribers.
pub struct SubscriptionHub {
    channels: Mutex<HashMap<Uuid, RequestChannel>>,
    next_observer_id: AtomicU64,
    replay_capacity: usize,
    observer_capacity: usize,
}

impl SubscriptionHub {
    pub fn new(replay_capacity: usize, observer_capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_observer_id: AtomicU64::new(0),
            replay_capacity,
            observer_capacity,
        }
    }

    /// Register an observer for a request.
    ///
    /// The buffered history is replayed into the new channel first, so a
    /// subscriber arriving after termination still receives the terminal
    /// event sequence. If earlier events have already been evicted from the
    /// replay ring the observer gets the best-effort tail and should fall
    /// back to a status query for full state.
    pub async fn subscribe(&self, request_id: Uuid) -> Subscription {
        let observer_id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);

        // Replay always fits: the ring holds at most replay_capacity events.
        let (tx, rx) = mpsc::channel(self.observer_capacity + self.replay_capacity);

        let mut channels = self.channels.lock().await;
        let channel = channels.entry(request_id).or_default();

        for event in &channel.replay {
            // Cannot fail: the channel is fresh and sized for the ring.
            let _ = tx.try_send(event.clone());
        }

        channel.observers.push(Observer {
            id: observer_id,
            tx,
        });
        debug!(%request_id, observer_id, "observer subscribed");

        Subscription {
            handle: SubscriptionHandle {
                request_id,
                observer_id,
            },
            events: rx,
        }
    }

    /// Stamp the next sequence number for the request, record the event in
    /// the replay ring, and deliver it to every current observer in publish
    /// order. Returns the stamped event.
    pub async fn publish(&self, request_id: Uuid, kind: ProgressEventKind) -> ProgressEvent {
        let mut channels = self.channels.lock().await;
        let channel = channels.entry(request_id).or_default();

        if channel.terminated {
            warn!(%request_id, "event published after terminal event");
        }

        let event = ProgressEvent::new(request_id, channel.next_sequence, kind);
        channel.next_sequence += 1;
        if event.is_terminal() {
            channel.terminated = true;
        }

        channel.replay.push_back(event.clone());
        while channel.replay.len() > self.replay_capacity {
            channel.replay.pop_front();
        }

        channel.observers.retain(|observer| {
            match observer.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(stuck)) => {
                    if stuck.is_terminal() {
                        // Terminal events must reach every reachable
                        // observer; hand the blocking send to its own task
                        // so this worker is not held hostage.
                        let tx = observer.tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(stuck).await;
                        });
                    } else {
                        warn!(
                            %request_id,
                            observer_id = observer.id,
                            sequence = stuck.sequence,
                            "observer buffer full, dropping non-terminal event"
                        );
                    }
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(%request_id, observer_id = observer.id, "observer gone");
                    false
                }
            }
        });

        event
    }

    /// Deregister an observer. Idempotent: unknown or already-removed
    /// handles are ignored.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(&handle.request_id) {
            channel.observers.retain(|o| o.id != handle.observer_id);
        }
    }

    /// Drop all state for a request (called once the queue evicts its
    /// terminal record).
    pub async fn retire(&self, request_id: Uuid) {
        self.channels.lock().await.remove(&request_id);
    }

    /// Number of currently registered observers for a request (diagnostic).
    pub async fn observer_count(&self, request_id: Uuid) -> usize {
        self.channels
            .lock()
            .await
            .get(&request_id)
            .map(|c| c.observers.len())
            .unwrap_or(0)
    }
}
