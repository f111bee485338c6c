//! Engine lifecycle events.
//!
//! A bounded broadcast bus. Publishing never blocks the protocol core: when
//! a subscriber lags past the buffer it loses the oldest events (tokio's
//! broadcast semantics) instead of backpressuring the engine.

use alloy_primitives::{Address, B256};
use tokio::sync::broadcast;

use strand_types::channel::ChannelState;
use strand_types::transactions::TransactionPurpose;
use strand_types::transfer::Transfer;

/// Events published by the engine and the transaction queue.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ChannelSetup {
        channel: ChannelState,
    },
    ChannelDeposited {
        channel: ChannelState,
        asset_id: Address,
    },
    TransferCreated {
        channel: ChannelState,
        transfer: Transfer,
    },
    TransferResolved {
        channel: ChannelState,
        transfer: Transfer,
    },
    TransactionSubmitted {
        channel: Address,
        purpose: TransactionPurpose,
        transaction_hash: B256,
    },
    TransactionMined {
        channel: Address,
        transaction_hash: B256,
    },
    TransactionFailed {
        channel: Address,
        transaction_hash: Option<B256>,
        reason: String,
    },
}

/// Bounded publish/subscribe fan-out for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. A send with no live subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}
