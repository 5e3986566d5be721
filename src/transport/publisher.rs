//! Fan-out of acknowledgments and status to every operator session

use crate::bridge::BridgePublisher;
use async_trait::async_trait;
use bridge_shared::{envelope::Payload, Done, Envelope, StatusReport};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

/// Frames buffered per session before the oldest are dropped
pub const OUTBOUND_CAPACITY: usize = 256;

/// [`BridgePublisher`] backed by a broadcast channel
///
/// Publishing never waits on sessions: with nobody subscribed the frame is
/// dropped, and a session that falls behind loses its oldest frames.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Envelope>,
    sequence_id: AtomicU64,
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(OUTBOUND_CAPACITY);
        Self {
            tx,
            sequence_id: AtomicU64::new(1),
        }
    }

    /// Receive every frame published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Sequence number for the next outbound frame, shared with responses
    pub fn next_sequence(&self) -> u64 {
        self.sequence_id.fetch_add(1, Ordering::SeqCst)
    }

    fn publish(&self, payload: Payload) {
        let envelope = Envelope::new(self.next_sequence(), payload);
        if self.tx.send(envelope).is_err() {
            trace!("No operator sessions, frame dropped");
        }
    }
}

#[async_trait]
impl BridgePublisher for BroadcastPublisher {
    async fn publish_done(&self) {
        self.publish(Payload::Done(Done {}));
    }

    async fn publish_status(&self, status: &str) {
        self.publish(Payload::Status(StatusReport {
            data: status.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_reach_every_subscriber() {
        let publisher = BroadcastPublisher::new();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish_status("battery=1.0").await;
        publisher.publish_done().await;

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap().payload {
                Some(Payload::Status(report)) => assert_eq!(report.data, "battery=1.0"),
                other => panic!("unexpected payload: {:?}", other),
            }
            assert!(matches!(rx.recv().await.unwrap().payload, Some(Payload::Done(_))));
        }
    }

    #[tokio::test]
    async fn test_sequence_increases() {
        let publisher = BroadcastPublisher::new();
        let mut rx = publisher.subscribe();

        publisher.publish_done().await;
        publisher.publish_done().await;

        let a = rx.recv().await.unwrap().sequence_id;
        let b = rx.recv().await.unwrap().sequence_id;
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_publish_without_sessions() {
        let publisher = BroadcastPublisher::new();
        publisher.publish_status("battery=0.0").await;
        assert_eq!(publisher.next_sequence(), 2);
    }
}
