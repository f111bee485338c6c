//! Persistence contract for the strand protocol engine.
//!
//! The engine persists through [`EngineStore`] and nothing else. The two
//! save operations that touch channel state are atomic at channel scope:
//! either the channel record and its transfer side-effects all land, or
//! nothing does. The engine relies on this to guarantee that a failure
//! mid-update leaves the channel unchanged.
//!
//! [`memory::InMemoryStore`] is the reference implementation used by tests
//! and single-process deployments; database-backed implementations live
//! outside this crate and only need to honor the same contract.

pub mod memory;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

use strand_types::commitment::WithdrawCommitment;
use strand_types::identifiers::PublicIdentifier;
use strand_types::transactions::{
    TransactionPurpose, TransactionReceiptRecord, TransactionResponse,
};
use strand_types::{ChannelState, Transfer, TransferFilter};

pub use memory::InMemoryStore;

/// A store operation failed.
///
/// Carries the failing method name; the engine surfaces these without
/// retrying.
#[derive(Debug, thiserror::Error)]
#[error("store method {method} failed: {reason}")]
pub struct StoreError {
    pub method: &'static str,
    pub reason: String,
}

impl StoreError {
    pub fn new(method: &'static str, reason: impl Into<String>) -> Self {
        StoreError {
            method,
            reason: reason.into(),
        }
    }
}

/// Durable storage the update engine requires.
#[async_trait]
pub trait EngineStore: Send + Sync {
    async fn get_channel_state(
        &self,
        channel: Address,
    ) -> Result<Option<ChannelState>, StoreError>;

    async fn get_channel_state_by_participants(
        &self,
        alice: &PublicIdentifier,
        bob: &PublicIdentifier,
        chain_id: u64,
    ) -> Result<Option<ChannelState>, StoreError>;

    async fn get_channel_states(&self) -> Result<Vec<ChannelState>, StoreError>;

    /// Unresolved transfers of a channel, in creation order.
    async fn get_active_transfers(&self, channel: Address) -> Result<Vec<Transfer>, StoreError>;

    async fn get_transfer_state(&self, transfer_id: B256)
    -> Result<Option<Transfer>, StoreError>;

    async fn get_transfers(&self, filter: &TransferFilter) -> Result<Vec<Transfer>, StoreError>;

    /// Atomically persists a channel state and the transfer side-effect of
    /// its latest update: an unresolved `transfer` joins the active set, a
    /// resolved one leaves it (remaining in history).
    async fn save_channel_state(
        &self,
        channel: &ChannelState,
        transfer: Option<&Transfer>,
    ) -> Result<(), StoreError>;

    /// Atomically persists a channel state and replaces its entire active
    /// transfer set. Used by restore flows.
    async fn save_channel_state_and_transfers(
        &self,
        channel: &ChannelState,
        active: &[Transfer],
    ) -> Result<(), StoreError>;

    async fn save_withdrawal_commitment(
        &self,
        transfer_id: B256,
        commitment: &WithdrawCommitment,
    ) -> Result<(), StoreError>;

    async fn get_withdrawal_commitment(
        &self,
        transfer_id: B256,
    ) -> Result<Option<WithdrawCommitment>, StoreError>;

    async fn get_withdrawal_commitment_by_transaction_hash(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<WithdrawCommitment>, StoreError>;

    async fn save_transaction_response(
        &self,
        channel: Address,
        purpose: TransactionPurpose,
        response: &TransactionResponse,
    ) -> Result<(), StoreError>;

    async fn save_transaction_receipt(
        &self,
        channel: Address,
        receipt: &TransactionReceiptRecord,
    ) -> Result<(), StoreError>;

    async fn save_transaction_failure(
        &self,
        channel: Address,
        transaction_hash: Option<B256>,
        reason: &str,
    ) -> Result<(), StoreError>;
}
