//! Event Bus module - change and completion notifications between components.
//!
//! The registry publishes [`PackEvent::ManifestRefreshed`] after a successful
//! refresh so caches holding module entries can drop stale ones. The binding
//! and lookup caches announce what they load and release, and synthesis
//! sessions announce run start and completion.
//!
//! Delivery is a synchronous fan-out over `std::sync::mpsc` channels: each
//! subscriber gets its own receiver and drains it on its own schedule.

use crate::streaming::PacketMetadata;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

/// Events published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum PackEvent {
    /// The pack manifest was re-parsed; previously resolved entries may be stale.
    ManifestRefreshed {
        actor_modules: usize,
        language_modules: usize,
    },
    /// New runtime bindings were created for a module.
    BindingsCreated { module_id: String, hashes: Vec<String> },
    /// Bindings no longer used by any module were released.
    BindingsReleased { module_id: String, hashes: Vec<String> },
    /// A lookup table became available under its content hash.
    LookupTableRegistered { hash: String, entries: usize },
    /// A lookup table was removed.
    LookupTableDeregistered { hash: String },
    /// A synthesis run started.
    RunStarted { session_id: String, warmup: bool },
    /// A synthesis run delivered its final packet.
    RunCompleted {
        metadata: PacketMetadata,
        warmup: bool,
    },
}

/// Event subscription handle.
#[derive(Debug)]
pub struct Subscription {
    id: usize,
    receiver: Receiver<PackEvent>,
}

impl Subscription {
    /// Try to receive the next event without blocking.
    pub fn try_recv(&self) -> Result<PackEvent, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive the next event, blocking until one is available.
    pub fn recv(&self) -> Result<PackEvent, mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Drain every event currently queued for this subscription.
    pub fn drain(&self) -> Vec<PackEvent> {
        self.receiver.try_iter().collect()
    }

    /// Get the subscription ID.
    pub fn id(&self) -> usize {
        self.id
    }
}

#[derive(Default)]
struct Subscribers {
    senders: HashMap<usize, Sender<PackEvent>>,
    next_id: usize,
}

/// Publish/subscribe hub shared by the registry, caches and sessions.
///
/// Cloning yields another handle to the same set of subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    /// Creates a new event bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // A panicking subscriber cannot leave the map half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event to all subscribers, dropping ones whose receiver is gone.
    pub fn publish(&self, event: PackEvent) {
        let mut subscribers = self.lock();
        subscribers
            .senders
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    /// Subscribe to events, returning a subscription handle.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        let mut subscribers = self.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.senders.insert(id, sender);
        Subscription { id, receiver }
    }

    /// Unsubscribe by subscription ID.
    pub fn unsubscribe(&self, subscription_id: usize) {
        self.lock().senders.remove(&subscription_id);
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
