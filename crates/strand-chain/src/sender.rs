//! Chain-write boundary.
//!
//! The engine never submits transactions inline with a channel update; it
//! hands [`ChainTransaction`]s to a per-signer queue which drives a
//! [`ChainSender`]. Implementations own wallet management, gas pricing, and
//! nonce handling; the protocol core only needs submission and confirmation.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

use strand_types::channel::ChannelState;
use strand_types::commitment::WithdrawCommitment;
use strand_types::transactions::{TransactionPurpose, TransactionReceiptRecord, TransactionResponse};

use crate::error::ChainError;

/// An on-chain action the engine can request.
#[derive(Debug, Clone)]
pub enum ChainTransaction {
    DeployChannel {
        channel: Address,
        alice: Address,
        bob: Address,
    },
    /// Deploys the channel and credits Alice's first deposit in one
    /// transaction. Before deployment this is the only way Alice may fund:
    /// direct sends to the channel address are credited to Bob.
    DeployChannelAndDepositAlice {
        channel: Address,
        alice: Address,
        bob: Address,
        asset_id: Address,
        amount: U256,
    },
    DepositAlice {
        channel: Address,
        asset_id: Address,
        amount: U256,
    },
    DepositBob {
        channel: Address,
        asset_id: Address,
        amount: U256,
    },
    Withdraw {
        commitment: WithdrawCommitment,
    },
    DisputeChannel {
        state: ChannelState,
    },
    Approve {
        channel: Address,
        asset_id: Address,
        amount: U256,
    },
}

impl ChainTransaction {
    pub fn purpose(&self) -> TransactionPurpose {
        match self {
            ChainTransaction::DeployChannel { .. } => TransactionPurpose::DeployChannel,
            ChainTransaction::DeployChannelAndDepositAlice { .. } => {
                TransactionPurpose::DeployChannelAndDepositAlice
            }
            ChainTransaction::DepositAlice { .. } => TransactionPurpose::DepositAlice,
            ChainTransaction::DepositBob { .. } => TransactionPurpose::DepositBob,
            ChainTransaction::Withdraw { .. } => TransactionPurpose::Withdraw,
            ChainTransaction::DisputeChannel { .. } => TransactionPurpose::DisputeChannel,
            ChainTransaction::Approve { .. } => TransactionPurpose::Approve,
        }
    }

    /// The channel this transaction belongs to, for event correlation.
    pub fn channel_address(&self) -> Address {
        match self {
            ChainTransaction::DeployChannel { channel, .. }
            | ChainTransaction::DeployChannelAndDepositAlice { channel, .. }
            | ChainTransaction::DepositAlice { channel, .. }
            | ChainTransaction::DepositBob { channel, .. }
            | ChainTransaction::Approve { channel, .. } => *channel,
            ChainTransaction::Withdraw { commitment } => commitment.channel_address,
            ChainTransaction::DisputeChannel { state } => state.channel_address,
        }
    }
}

/// Submission of on-chain transactions for one signer.
#[async_trait]
pub trait ChainSender: Send + Sync {
    /// Signs and broadcasts the transaction, returning as soon as it is
    /// accepted by the mempool.
    async fn submit(
        &self,
        chain_id: u64,
        tx: &ChainTransaction,
    ) -> Result<TransactionResponse, ChainError>;

    /// Waits until the submitted transaction is mined.
    async fn wait_mined(
        &self,
        chain_id: u64,
        transaction_hash: B256,
    ) -> Result<TransactionReceiptRecord, ChainError>;
}
