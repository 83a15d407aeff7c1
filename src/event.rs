// MIT License
// State-change events and the sinks that accept them

use std::future::Future;

use tokio::sync::mpsc;

use crate::devices::Kind;
use crate::error::{BridgeError, Result};

/// One detected transition, ready for publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub kind: Kind,
    pub index: u32,
    pub payload: &'static str,
}

impl NormalizedEvent {
    /// Stable id of the entity, e.g. `zone-11`.
    pub fn unique_id(&self) -> String {
        self.kind.unique_id(self.index)
    }
}

/// Downstream consumer of state changes.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &NormalizedEvent) -> impl Future<Output = Result<()>> + Send;
}

/// Sender half of an in-process event channel.
pub type EventSender = mpsc::Sender<NormalizedEvent>;

/// Receiver half of an in-process event channel.
pub type EventReceiver = mpsc::Receiver<NormalizedEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

impl EventSink for EventSender {
    async fn publish(&self, event: &NormalizedEvent) -> Result<()> {
        self.send(*event).await.map_err(|_| BridgeError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (tx, mut rx) = event_channel(4);
        let event = NormalizedEvent {
            kind: Kind::Zone,
            index: 11,
            payload: "unavailable",
        };
        tx.publish(&event).await.unwrap();
        assert_eq!(rx.recv().await, Some(event));
        assert_eq!(event.unique_id(), "zone-11");
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (tx, rx) = event_channel(1);
        drop(rx);
        let event = NormalizedEvent {
            kind: Kind::Output,
            index: 1,
            payload: "ON",
        };
        assert!(matches!(tx.publish(&event).await, Err(BridgeError::ChannelClosed)));
    }
}
