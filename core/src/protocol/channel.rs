//! In-memory, ordered message channel between the two contexts
//!
//! Each direction is an unbounded mpsc queue, so per-direction send order is
//! preserved and sending never blocks. The two directions are independent.

use tokio::sync::mpsc;

use super::Message;
use crate::error::{BridgeError, Result};

/// Sending half owned by one context
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    pub fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| BridgeError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub type Inbox = mpsc::UnboundedReceiver<Message>;

/// One context's view of the channel
#[derive(Debug)]
pub struct Endpoint {
    pub outbox: Outbox,
    pub inbox: Inbox,
}

/// Create two connected endpoints: whatever one sends, the other receives.
pub fn pair() -> (Endpoint, Endpoint) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();

    (
        Endpoint {
            outbox: Outbox::new(a_tx),
            inbox: a_rx,
        },
        Endpoint {
            outbox: Outbox::new(b_tx),
            inbox: b_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Handle;

    #[tokio::test]
    async fn test_pair_preserves_order_per_direction() {
        let (left, mut right) = pair();

        for i in 0..5u8 {
            left.outbox.send(Message::output(Handle(1), &[b'a' + i])).unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..5 {
            received.push(right.inbox.recv().await.unwrap());
        }

        let expected: Vec<Message> = (0..5u8)
            .map(|i| Message::output(Handle(1), &[b'a' + i]))
            .collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (left, right) = pair();
        drop(right);

        assert!(left.outbox.is_closed());
        assert_eq!(
            left.outbox.send(Message::Run(None)),
            Err(BridgeError::ChannelClosed)
        );
    }
}
