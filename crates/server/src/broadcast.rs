//! Event broadcast
//!
//! Bounded pub/sub fan-out of [`EngineEvent`]s. Each subscriber gets its
//! own bounded queue; a subscriber that stops draining loses the oldest
//! events rather than blocking publishers.

use agrama_core::EngineEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default per-subscriber queue depth
const DEFAULT_QUEUE_DEPTH: usize = 1024;

struct SubscriberQueue {
    events: Mutex<VecDeque<EngineEvent>>,
    depth: usize,
}

/// Receiving half of a subscription
pub struct EventSubscriber {
    queue: Arc<SubscriberQueue>,
}

impl EventSubscriber {
    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.queue.events.lock().drain(..).collect()
    }

    /// Pop the oldest queued event
    pub fn next(&self) -> Option<EngineEvent> {
        self.queue.events.lock().pop_front()
    }

    /// Events currently queued
    pub fn len(&self) -> usize {
        self.queue.events.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.events.lock().is_empty()
    }
}

/// The broadcaster
pub struct EventBroadcaster {
    subscribers: Mutex<Vec<Arc<SubscriberQueue>>>,
    depth: usize,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

impl EventBroadcaster {
    /// Create a broadcaster with the given per-subscriber queue depth
    pub fn new(depth: usize) -> Self {
        EventBroadcaster {
            subscribers: Mutex::new(Vec::new()),
            depth: depth.max(1),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> EventSubscriber {
        let queue = Arc::new(SubscriberQueue {
            events: Mutex::new(VecDeque::new()),
            depth: self.depth,
        });
        self.subscribers.lock().push(Arc::clone(&queue));
        EventSubscriber { queue }
    }

    /// Publish an event to every live subscriber. Queues at capacity drop
    /// their oldest event; abandoned subscribers are pruned.
    pub fn publish(&self, event: &EngineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|queue| Arc::strong_count(queue) > 1);
        for queue in subscribers.iter() {
            let mut events = queue.events.lock();
            if events.len() >= queue.depth {
                events.pop_front();
            }
            events.push_back(event.clone());
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|queue| Arc::strong_count(queue) > 1);
        subscribers.len()
    }
}
