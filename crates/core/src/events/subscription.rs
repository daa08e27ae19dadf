// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriptions and their bounded delivery queues

use crate::event::StateTransitionEvent;
use crate::instance::{InstanceState, StateMask};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Notify;

/// Subscriber handle for unsubscribing
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interest in a set of lifecycle states
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub interest: StateMask,
    pub description: String,
}

impl Subscription {
    pub fn new(interest: StateMask, description: impl Into<String>) -> Self {
        Self {
            id: SubscriberId::generate(),
            interest,
            description: description.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = SubscriberId(id.into());
        self
    }

    pub fn matches(&self, state: InstanceState) -> bool {
        self.interest.accepts(state)
    }
}

/// Outcome of pushing an event into an inbox
#[derive(Debug)]
pub(crate) enum Delivery {
    Queued,
    /// Inbox was full; the oldest queued event was discarded
    DroppedOldest(StateTransitionEvent),
    /// Receiver is gone
    Closed,
}

#[derive(Default)]
struct InboxState {
    events: VecDeque<StateTransitionEvent>,
    closed: bool,
    dropped: u64,
}

/// Bounded FIFO shared between the bus and one receiver.
///
/// Overflow policy: drop-oldest. Pushing never waits.
pub(crate) struct Inbox {
    capacity: usize,
    state: Mutex<InboxState>,
    notify: Notify,
}

impl Inbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(InboxState::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn push(&self, event: StateTransitionEvent) -> Delivery {
        let delivery = {
            let mut state = self.lock();
            if state.closed {
                return Delivery::Closed;
            }
            let evicted = if state.events.len() >= self.capacity {
                state.dropped += 1;
                state.events.pop_front()
            } else {
                None
            };
            state.events.push_back(event);
            match evicted {
                Some(old) => Delivery::DroppedOldest(old),
                None => Delivery::Queued,
            }
        };
        self.notify.notify_one();
        delivery
    }

    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Errors from a non-blocking receive
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("no event queued")]
    Empty,
    #[error("subscription closed")]
    Closed,
}

/// Receiving half of a subscription.
///
/// Dropping the receiver withdraws the subscription; the bus prunes it on
/// the next publish.
pub struct EventReceiver {
    id: SubscriberId,
    inbox: Arc<Inbox>,
}

impl EventReceiver {
    pub(crate) fn new(id: SubscriberId, inbox: Arc<Inbox>) -> Self {
        Self { id, inbox }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Wait for the next event. Queued events are still drained after the
    /// subscription closes; `None` means closed and empty.
    pub async fn recv(&mut self) -> Option<StateTransitionEvent> {
        loop {
            let notified = self.inbox.notify.notified();
            {
                let mut state = self.inbox.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn try_recv(&mut self) -> Result<StateTransitionEvent, TryRecvError> {
        let mut state = self.inbox.lock();
        match state.events.pop_front() {
            Some(event) => Ok(event),
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Number of events discarded by the overflow policy so far
    pub fn dropped(&self) -> u64 {
        self.inbox.lock().dropped
    }

    pub fn len(&self) -> usize {
        self.inbox.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.inbox.close();
    }
}

impl fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReceiver")
            .field("id", &self.id)
            .field("queued", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
