// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus for routing transition events to subscribers

use super::subscription::{Delivery, EventReceiver, Inbox, SubscriberId, Subscription};
use crate::event::StateTransitionEvent;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Default per-subscriber queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct Registry {
    subscribers: RwLock<HashMap<SubscriberId, (Subscription, Arc<Inbox>)>>,
    capacity: usize,
}

impl Drop for Registry {
    fn drop(&mut self) {
        let subs = self.subscribers.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, inbox) in subs.values() {
            inbox.close();
        }
    }
}

/// The event bus routes events to subscribers whose interest mask
/// intersects the event's state flag.
///
/// Publishing never waits on a subscriber: each one has its own bounded
/// inbox and a full inbox sheds its oldest event.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus whose subscriber inboxes hold up to `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.registry.capacity
    }

    /// Register a subscription and return its receiving half
    pub fn subscribe(&self, subscription: Subscription) -> EventReceiver {
        let inbox = Arc::new(Inbox::new(self.registry.capacity));
        let id = subscription.id.clone();

        tracing::debug!(
            subscriber = %id,
            interest = %subscription.interest,
            description = %subscription.description,
            "adding event listener"
        );

        let mut subs = self
            .registry
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if let Some((_, replaced)) = subs.insert(id.clone(), (subscription, Arc::clone(&inbox))) {
            replaced.close();
        }

        EventReceiver::new(id, inbox)
    }

    /// Withdraw a subscription. Its receiver drains what is queued, then
    /// observes the close.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self
            .registry
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        match removed {
            Some((_, inbox)) => {
                inbox.close();
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: &StateTransitionEvent) -> usize {
        let state = event.current();
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let subs = self
                .registry
                .subscribers
                .read()
                .unwrap_or_else(|e| e.into_inner());
            for (id, (subscription, inbox)) in subs.iter() {
                if !subscription.matches(state) {
                    continue;
                }
                tracing::trace!(
                    subscriber = %id,
                    interest = %subscription.interest,
                    %state,
                    "matched subscriber"
                );
                match inbox.push(event.clone()) {
                    Delivery::Queued => delivered += 1,
                    Delivery::DroppedOldest(old) => {
                        delivered += 1;
                        tracing::warn!(
                            subscriber = %id,
                            description = %subscription.description,
                            dropped = %old,
                            "subscriber queue full, dropped oldest event"
                        );
                    }
                    Delivery::Closed => closed.push(id.clone()),
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = self
                .registry
                .subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner());
            for id in closed {
                // A fresh subscription may have reused the id meanwhile
                if subs.get(&id).is_some_and(|(_, inbox)| inbox.is_closed()) {
                    tracing::debug!(subscriber = %id, "pruning closed subscriber");
                    subs.remove(&id);
                }
            }
        }

        delivered
    }

    /// Get count of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// List all subscription IDs
    pub fn list_subscriptions(&self) -> Vec<SubscriberId> {
        self.registry
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
