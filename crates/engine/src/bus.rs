//! Shared event bus
//!
//! Every subscriber gets its own unbounded stream, so a slow reporter never
//! holds up execution or another reporter.

use parking_lot::Mutex;
use specline_common::event::RunEvent;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<RunEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<RunEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber, dropping those that went away
    pub fn publish(&self, event: RunEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// End every subscriber stream
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specline_common::result::RunSummary;

    #[tokio::test]
    async fn test_each_subscriber_gets_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(RunEvent::RunEnd {
            summary: RunSummary::default(),
        });
        bus.close();

        assert_eq!(a.recv().await.map(|e| e.name()), Some("run-end"));
        assert_eq!(b.recv().await.map(|e| e.name()), Some("run-end"));
        assert!(a.recv().await.is_none());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        bus.publish(RunEvent::RunEnd {
            summary: RunSummary::default(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
