//! Fire-and-forget notification fan-out.
//!
//! Publishing must never block settlement on a slow or absent subscriber:
//! the hub is a bounded broadcast ring, and a subscriber that lags past
//! the capacity loses the oldest events (`RecvError::Lagged`) instead of
//! stalling the publisher.

use gigmesh_core::records::{GigKey, GigStatus};
use gigmesh_core::types::{PaymentHash, Preimage};
use tokio::sync::broadcast;

/// Events produced by the Settler for delivery hubs.
#[derive(Clone, Debug)]
pub enum SettlerEvent {
    /// A gig changed lifecycle status. `symmetric_key` carries the reply
    /// decryption key from `Accepted` onward.
    GigStatusChanged {
        key: GigKey,
        status: GigStatus,
        symmetric_key: Option<[u8; 32]>,
    },
    /// An escrow secret became public; holders of dependent invoice legs
    /// use it to settle their own.
    PreimageRevealed {
        payment_hash: PaymentHash,
        preimage: Preimage,
    },
}

/// Bounded publish/subscribe registry.
pub struct EventHub {
    tx: broadcast::Sender<SettlerEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlerEvent> {
        self.tx.subscribe()
    }

    /// Enqueue for all current subscribers; never blocks, never fails.
    /// An event published with no subscribers is dropped.
    pub fn publish(&self, event: SettlerEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigmesh_core::types::CertificateId;

    fn key() -> GigKey {
        GigKey::new(CertificateId([1; 16]), CertificateId([2; 16]))
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();
        hub.publish(SettlerEvent::GigStatusChanged {
            key: key(),
            status: GigStatus::Accepted,
            symmetric_key: Some([3; 32]),
        });
        match rx.recv().await.unwrap() {
            SettlerEvent::GigStatusChanged { status, .. } => {
                assert_eq!(status, GigStatus::Accepted)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest_without_blocking() {
        let hub = EventHub::new(2);
        let mut rx = hub.subscribe();
        for i in 0..5u8 {
            hub.publish(SettlerEvent::PreimageRevealed {
                payment_hash: PaymentHash([i; 32]),
                preimage: Preimage([i; 32]),
            });
        }
        // The ring kept only the newest two; the first recv reports the lag.
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(_))));
        match rx.recv().await.unwrap() {
            SettlerEvent::PreimageRevealed { payment_hash, .. } => {
                assert_eq!(payment_hash, PaymentHash([3; 32]));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let hub = EventHub::new(2);
        hub.publish(SettlerEvent::PreimageRevealed {
            payment_hash: PaymentHash([0; 32]),
            preimage: Preimage([0; 32]),
        });
    }
}
