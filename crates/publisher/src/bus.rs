use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use common::MarketEvent;

/// Fan-out of published events to every registered subscriber.
///
/// Each subscriber owns a bounded queue. Overflow policy is reject-new:
/// when a subscriber's queue is full the event is dropped for that
/// subscriber only and counted, other subscribers are unaffected.
/// Subscribers that register later get no backlog.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<MarketEvent>,
    dropped: u64,
}

/// Receiving end handed to one subscriber.
pub struct Subscription {
    pub id: u64,
    rx: mpsc::Receiver<MarketEvent>,
}

impl Subscription {
    /// Next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<MarketEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MarketEvent> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers found gone and unregistered.
    pub closed: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().push(Subscriber { id, tx, dropped: 0 });
        debug!(subscriber = id, "Event bus subscriber registered");
        Subscription { id, rx }
    }

    /// Deliver `event` to every current subscriber without waiting.
    pub fn publish(&self, event: &MarketEvent) -> Delivery {
        let mut delivery = Delivery::default();
        self.subscribers().retain_mut(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => {
                delivery.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                sub.dropped += 1;
                delivery.dropped += 1;
                warn!(
                    subscriber = sub.id,
                    total_dropped = sub.dropped,
                    kind = %event.kind(),
                    "Subscriber queue full, event dropped"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                delivery.closed += 1;
                debug!(subscriber = sub.id, "Subscriber gone, unregistering");
                false
            }
        });
        delivery
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Events dropped so far for subscriber `id`.
    pub fn dropped_for(&self, id: u64) -> Option<u64> {
        self.subscribers().iter().find(|s| s.id == id).map(|s| s.dropped)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.inner.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
