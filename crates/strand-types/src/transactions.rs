//! On-chain transaction lifecycle records.
//!
//! The engine never mutates channel state in response to on-chain
//! transactions; these records exist so submissions can be audited and
//! correlated with withdrawal commitments.

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::balance::u256_decimal;

/// Why a transaction was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionPurpose {
    DeployChannel,
    DeployChannelAndDepositAlice,
    DepositAlice,
    DepositBob,
    Withdraw,
    DisputeChannel,
    Approve,
}

/// A submitted transaction, before it is mined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction_hash: B256,
    pub chain_id: u64,
    pub to: Address,
    #[serde(with = "u256_decimal")]
    pub value: U256,
    pub data: Bytes,
}

/// The mined outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceiptRecord {
    pub transaction_hash: B256,
    pub chain_id: u64,
    /// `true` when the transaction succeeded.
    pub status: bool,
    pub block_number: u64,
}
