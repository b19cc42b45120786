//! Process lifecycle event broadcasting.
//!
//! The supervisor publishes every start, stop request and exit here; streaming
//! sessions subscribe to relay them to clients.

use mhos_core::ProcessEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast channel capacity for lifecycle events
const CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for process lifecycle events.
#[derive(Debug, Clone)]
pub struct ProcessEventBroadcaster {
    sender: broadcast::Sender<ProcessEvent>,
}

impl ProcessEventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ProcessEvent) {
        // Only log if there are receivers (avoid spam when no clients)
        if self.sender.receiver_count() > 0 {
            debug!(?event, "Broadcasting process event");
            let _ = self.sender.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProcessEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let broadcaster = ProcessEventBroadcaster::new();
        broadcaster.publish(ProcessEvent::started("organizer", 1));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_events() {
        let broadcaster = ProcessEventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();

        broadcaster.publish(ProcessEvent::exited("organizer", 7, Some(0), 1500));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.pid, 7);
        assert_eq!(event.exit_code, Some(0));
    }
}
