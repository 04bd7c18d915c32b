use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for booking lifecycle events, one channel per store.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a store. Creates the channel if needed.
    pub fn subscribe(&self, store_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(store_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event to its store's channel. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&event.store_id()) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a store's channel; existing receivers see it close.
    pub fn remove(&self, store_id: &Ulid) {
        self.channels.remove(store_id);
    }
}
