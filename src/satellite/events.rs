//! Event subscriptions of tracked objects
//!
//! Each subscription is identified by a [`SubscriptionHandle`] token that must
//! be handed back to [`EventBus::unsubscribe`] to release it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::satellite::components::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    ClockTick,
    SelectionChanged,
    TrackedChanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneEvent {
    ClockTick(DateTime<Utc>),
    SelectionChanged(Option<ObjectId>),
    TrackedChanged(Option<ObjectId>),
}

impl SceneEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SceneEvent::ClockTick(_) => EventKind::ClockTick,
            SceneEvent::SelectionChanged(_) => EventKind::SelectionChanged,
            SceneEvent::TrackedChanged(_) => EventKind::TrackedChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    kind: EventKind,
    token: u64,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    next_token: u64,
    listeners: BTreeMap<EventKind, BTreeMap<u64, ObjectId>>,
}

impl EventBus {
    pub fn subscribe(&mut self, kind: EventKind, listener: ObjectId) -> SubscriptionHandle {
        self.next_token += 1;
        let token = self.next_token;
        self.listeners.entry(kind).or_default().insert(token, listener);
        SubscriptionHandle { kind, token }
    }

    /// Returns false for a handle that was already released
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.listeners
            .get_mut(&handle.kind)
            .and_then(|l| l.remove(&handle.token))
            .is_some()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, |l| l.len())
    }

    /// Subscriptions held by one listener across all kinds
    pub fn subscriptions_of(&self, listener: ObjectId) -> usize {
        self.listeners
            .values()
            .flat_map(|l| l.values())
            .filter(|o| **o == listener)
            .count()
    }

    /// Listeners to notify for `event`, in subscription order
    pub fn recipients(&self, event: &SceneEvent) -> Vec<ObjectId> {
        self.listeners
            .get(&event.kind())
            .map(|l| l.values().copied().collect())
            .unwrap_or_default()
    }
}
