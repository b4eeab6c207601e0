//! Event Broadcaster
//!
//! Fan-out of overlay events to every connected subscriber. Publishing never
//! waits on subscribers: a slow subscriber lags and skips events instead of
//! stalling the economy.

use tokio::sync::broadcast;
use tracing::debug;

use crate::network::protocol::OverlayEvent;

/// Events buffered per subscriber before it starts lagging.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Best-effort publish/subscribe channel for overlay events.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<OverlayEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl Broadcaster {
    /// Create a broadcaster with the given per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers it was queued for.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: OverlayEvent) -> usize {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(topic, "no overlay subscribers");
                0
            }
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.tx.subscribe()
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
