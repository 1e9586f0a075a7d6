// ── Per-resource event fan-out ──
//
// One broadcast channel per resource name, created lazily on first
// subscribe. Publishing to a resource nobody listens to is a no-op.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::message::ResourceMessage;

const RESOURCE_CHANNEL_CAPACITY: usize = 256;

/// Routes incoming [`ResourceMessage`]s to per-resource subscribers.
#[derive(Debug, Default)]
pub struct EventHub {
    channels: DashMap<String, broadcast::Sender<Arc<ResourceMessage>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to messages for one resource name.
    pub fn subscribe(&self, resource: &str) -> broadcast::Receiver<Arc<ResourceMessage>> {
        self.channels
            .entry(resource.to_owned())
            .or_insert_with(|| broadcast::channel(RESOURCE_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a message to the subscribers of `message.model`.
    ///
    /// Returns the number of receivers that got it.
    pub fn publish(&self, message: ResourceMessage) -> usize {
        let Some(tx) = self.channels.get(&message.model) else {
            tracing::trace!(model = %message.model, "no subscribers for resource");
            return 0;
        };
        // Ignore send errors -- just means no active subscribers right now
        tx.send(Arc::new(message)).unwrap_or(0)
    }

    /// Resource names that currently have a channel.
    pub fn resources(&self) -> Vec<String> {
        self.channels.iter().map(|r| r.key().clone()).collect()
    }
}
