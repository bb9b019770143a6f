/// Order event fan-out.
///
/// Every subscriber owns an independent unbounded queue, so a slow
/// subscriber never blocks publishers or other subscribers. Batches are
/// delivered to each subscriber in publish order.
use std::collections::BTreeMap;
use std::sync::Arc;

use containers::OrderEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct FeedInner {
    next_id: u64,
    subscribers: BTreeMap<u64, mpsc::UnboundedSender<Vec<OrderEvent>>>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderEventFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl OrderEventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> OrderEventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, sender);
        debug!(subscription = id, "Order event subscriber added");

        OrderEventSubscription {
            id,
            receiver,
            feed: self.clone(),
        }
    }

    /// Delivers `events` as one batch to every live subscriber and returns
    /// how many received it. Closed subscribers are dropped here.
    pub fn publish(&self, events: Vec<OrderEvent>) -> usize {
        if events.is_empty() {
            return 0;
        }

        // Sending under the lock keeps batch order identical for everyone.
        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|id, sender| match sender.send(events.clone()) {
                Ok(()) => true,
                Err(_) => {
                    trace!(subscription = id, "Pruned closed order event subscriber");
                    false
                }
            });
        inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn remove(&self, id: u64) {
        if self.inner.lock().subscribers.remove(&id).is_some() {
            debug!(subscription = id, "Order event subscriber removed");
        }
    }
}

pub struct OrderEventSubscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Vec<OrderEvent>>,
    feed: OrderEventFeed,
}

impl OrderEventSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Vec<OrderEvent>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<OrderEvent>> {
        self.receiver.try_recv().ok()
    }

    /// Every event delivered so far, flattened.
    pub fn drain(&mut self) -> Vec<OrderEvent> {
        let mut events = Vec::new();
        while let Some(batch) = self.try_recv() {
            events.extend(batch);
        }
        events
    }

    pub fn unsubscribe(self) {
        self.feed.remove(self.id);
    }
}
