use crate::core::error::DeliveryError;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque per-connection subscriber id
pub type SubscriberId = String;

/// Receives broadcast events for one live connection
pub trait Subscriber: Send + Sync {
    fn deliver(&self, event: &str, payload: &str) -> Result<(), DeliveryError>;
}

impl<F> Subscriber for F
where
    F: Fn(&str, &str) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, event: &str, payload: &str) -> Result<(), DeliveryError> {
        self(event, payload)
    }
}

/// Outcome of one broadcast
#[derive(Debug, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<(SubscriberId, DeliveryError)>,
}

/// Fans named events out to every registered subscriber.
///
/// Failed deliveries never remove a subscriber; removal only happens through
/// [`BroadcastRegistry::unregister`].
pub struct BroadcastRegistry {
    subscribers: DashMap<SubscriberId, Arc<dyn Subscriber>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Register `subscriber` under `id`, replacing any earlier registration.
    /// Returns true when an entry was replaced.
    pub fn register(&self, id: impl Into<SubscriberId>, subscriber: Arc<dyn Subscriber>) -> bool {
        let id = id.into();
        let replaced = self.subscribers.insert(id.clone(), subscriber).is_some();

        debug!(
            subscriber_id = %id,
            replaced,
            subscribers = self.subscribers.len(),
            "Subscriber registered"
        );
        replaced
    }

    /// Remove `id` if present. Returns true when an entry was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            debug!(
                subscriber_id = %id,
                subscribers = self.subscribers.len(),
                "Subscriber unregistered"
            );
        }
        removed
    }

    /// Deliver `(event, payload)` to every subscriber registered at the time of the call
    pub fn broadcast(&self, event: &str, payload: &str) -> BroadcastReport {
        // Deliver outside the shard locks so a subscriber can (un)register from its callback
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, subscriber) in targets {
            match subscriber.deliver(event, payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        subscriber_id = %id,
                        event,
                        error = %e,
                        "Failed to deliver event to subscriber"
                    );
                    report.failed.push((id, e));
                }
            }
        }

        debug!(
            event,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast complete"
        );
        report
    }

    pub fn contains(&self, id: &str) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new()
    }
}
