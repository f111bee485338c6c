//! Protocol messaging boundary.
//!
//! The engine needs exactly one messaging primitive: a correlated
//! request/reply exchange of protocol messages with the counterparty.
//! Transport internals (pub/sub brokers, websockets) live behind
//! [`ProtocolMessenger`]; [`memory`] provides the in-process implementation
//! used by tests and co-located peers.

use async_trait::async_trait;
use std::time::Duration;

use strand_types::identifiers::PublicIdentifier;
use strand_types::protocol::{ProtocolReply, ProtocolUpdate};

/// Transport-level messaging failures.
///
/// Protocol-level rejections are not errors at this layer; they travel
/// inside [`ProtocolReply`].
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("no reply from {to} within {timeout:?}")]
    Timeout { to: String, timeout: Duration },
    #[error("peer {0} is not reachable")]
    Unreachable(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A received protocol request, with its reply slot.
pub struct InboundProtocolUpdate {
    pub from: PublicIdentifier,
    pub message: ProtocolUpdate,
    reply: tokio::sync::oneshot::Sender<ProtocolReply>,
}

impl InboundProtocolUpdate {
    pub fn new(
        from: PublicIdentifier,
        message: ProtocolUpdate,
        reply: tokio::sync::oneshot::Sender<ProtocolReply>,
    ) -> Self {
        InboundProtocolUpdate {
            from,
            message,
            reply,
        }
    }

    /// Sends the reply. Dropping the slot without responding surfaces as a
    /// timeout on the requesting side.
    pub fn respond(self, reply: ProtocolReply) {
        let _ = self.reply.send(reply);
    }
}

/// Reliable request/reply messaging between the two participants.
#[async_trait]
pub trait ProtocolMessenger: Send + Sync {
    /// Sends a protocol update and waits for the peer's reply.
    async fn send_protocol_update(
        &self,
        to: &PublicIdentifier,
        message: ProtocolUpdate,
        timeout: Duration,
    ) -> Result<ProtocolReply, MessagingError>;

    /// Waits for the next inbound request. Returns `None` once the transport
    /// shuts down.
    async fn next_inbound(&self) -> Option<InboundProtocolUpdate>;
}

/// In-process loopback transport: a pair of connected endpoints.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::{Mutex, mpsc, oneshot};

    /// One side of an in-process messenger pair.
    pub struct MemoryMessenger {
        identifier: PublicIdentifier,
        peers: HashMap<PublicIdentifier, mpsc::Sender<InboundProtocolUpdate>>,
        inbound: Mutex<mpsc::Receiver<InboundProtocolUpdate>>,
    }

    /// Builds two connected endpoints, one per participant.
    pub fn pair(a: PublicIdentifier, b: PublicIdentifier) -> (MemoryMessenger, MemoryMessenger) {
        let (to_a, from_b) = mpsc::channel(16);
        let (to_b, from_a) = mpsc::channel(16);
        let messenger_a = MemoryMessenger {
            identifier: a.clone(),
            peers: HashMap::from([(b.clone(), to_b)]),
            inbound: Mutex::new(from_b),
        };
        let messenger_b = MemoryMessenger {
            identifier: b,
            peers: HashMap::from([(a, to_a)]),
            inbound: Mutex::new(from_a),
        };
        (messenger_a, messenger_b)
    }

    #[async_trait]
    impl ProtocolMessenger for MemoryMessenger {
        async fn send_protocol_update(
            &self,
            to: &PublicIdentifier,
            message: ProtocolUpdate,
            timeout: Duration,
        ) -> Result<ProtocolReply, MessagingError> {
            let peer = self
                .peers
                .get(to)
                .ok_or_else(|| MessagingError::Unreachable(to.to_string()))?;
            let (reply_tx, reply_rx) = oneshot::channel();
            let inbound =
                InboundProtocolUpdate::new(self.identifier.clone(), message, reply_tx);
            peer.send(inbound)
                .await
                .map_err(|_| MessagingError::Unreachable(to.to_string()))?;
            match tokio::time::timeout(timeout, reply_rx).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(MessagingError::Transport(
                    "peer dropped the request without replying".to_string(),
                )),
                Err(_) => Err(MessagingError::Timeout {
                    to: to.to_string(),
                    timeout,
                }),
            }
        }

        async fn next_inbound(&self) -> Option<InboundProtocolUpdate> {
            self.inbound.lock().await.recv().await
        }
    }
}
