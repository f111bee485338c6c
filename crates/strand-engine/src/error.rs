//! Engine error taxonomy.
//!
//! Five classes, handled differently:
//!
//! - transient chain failures are retried inside the chain reader and arrive
//!   here already exhausted;
//! - protocol failures carry a [`ProtocolErrorReason`] and are shared with
//!   the counterparty;
//! - validation failures are local, never retried, never persisted;
//! - store failures surface the failing method and are never retried;
//! - signature failures on countersigned data and nonce gaps of three or
//!   more are non-recoverable without a restore.

use alloy_primitives::{Address, B256, U256};
use std::time::Duration;

use strand_chain::ChainError;
use strand_store::StoreError;
use strand_types::codec::CodecError;
use strand_types::protocol::ProtocolErrorReason;
use strand_types::signing::SigningError;
use strand_types::update::UpdateType;

use crate::messaging::MessagingError;

/// A per-type validation rule was violated.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("channel {0} does not exist")]
    ChannelNotFound(Address),
    #[error("channel {0} already exists")]
    ChannelAlreadySetup(Address),
    #[error("channel {0} is in dispute")]
    InDispute(Address),
    #[error("derived channel address {derived} does not match {given}")]
    ChannelAddressMismatch { derived: Address, given: Address },
    #[error("{0} is not a participant of this channel")]
    NotParticipant(String),
    #[error("expected update nonce {expected}, got {actual}")]
    InvalidUpdateNonce { expected: u64, actual: u64 },
    #[error("invalid timeout {0}")]
    InvalidTimeout(u64),
    #[error("transfer timeout {transfer} exceeds channel timeout {channel}")]
    TransferTimeoutAboveChannel { transfer: u64, channel: u64 },
    #[error("asset {0} has not been deposited into this channel")]
    AssetNotFound(Address),
    #[error("insufficient channel funds: required {required}, available {available}")]
    InsufficientFunds { required: U256, available: U256 },
    #[error("transfer balance recipient {0} is not a channel participant")]
    RecipientNotParticipant(Address),
    #[error("transfer {0} is not active")]
    TransferNotActive(B256),
    #[error("only the transfer responder may resolve")]
    OnlyResponderMayResolve,
    #[error("transfer encodings do not match the registered definition")]
    EncodingMismatch,
    #[error("transfer definition rejected the initial state")]
    CreateRejected,
    #[error("resolved amounts sum to {resolved}, locked balance is {locked}")]
    InvalidResolve { locked: U256, resolved: U256 },
    #[error("invalid deposit totals: {0}")]
    InvalidDepositTotals(String),
    #[error("recomputed merkle root does not match the update")]
    MerkleRootMismatch,
    #[error("recomputed balance does not match the update")]
    BalanceMismatch,
    #[error("malformed update: {0}")]
    MalformedUpdate(String),
    #[error("sender signature missing on inbound update")]
    MissingSignature,
    #[error(transparent)]
    Signature(#[from] SigningError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    ChainRead(#[from] ChainError),
    #[error("external validation rejected the update: {0}")]
    External(String),
}

impl ValidationError {
    /// The protocol reason shared with the counterparty when this failure
    /// occurs on the inbound path.
    pub fn protocol_reason(&self) -> ProtocolErrorReason {
        match self {
            ValidationError::Signature(_) | ValidationError::MissingSignature => {
                ProtocolErrorReason::BadSignatures
            }
            _ => ProtocolErrorReason::ValidationFailed,
        }
    }
}

/// Top-level failure of an engine operation.
///
/// Every variant carries enough structured context (channel, nonce, update
/// type) for callers to log and correlate. No variant implies partial
/// persistence: the engine persists only as its final step.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed for {update_type} update on {channel}: {source}")]
    Validation {
        update_type: UpdateType,
        channel: Address,
        #[source]
        source: ValidationError,
    },
    #[error("counterparty rejected {update_type} update on {channel} at nonce {nonce} ({reason}): {message}")]
    CounterpartyRejected {
        reason: ProtocolErrorReason,
        update_type: UpdateType,
        channel: Address,
        nonce: u64,
        message: String,
    },
    #[error("channel {channel} advanced to nonce {observed} while the proposal was pending")]
    StaleUpdate { channel: Address, observed: u64 },
    #[error("restore required for {channel}: local nonce {local}, peer nonce {peer}")]
    RestoreNeeded {
        channel: Address,
        local: u64,
        peer: u64,
    },
    #[error("sync aborted for {channel}: {reason}")]
    CannotSync {
        channel: Address,
        reason: ProtocolErrorReason,
    },
    #[error("countersigned update on {channel} failed signature verification: {message}")]
    BadSignatures { channel: Address, message: String },
    #[error("failed to persist channel {channel}: {source}")]
    SaveChannelFailed {
        channel: Address,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("withdrawal commitment error: {0}")]
    Withdrawal(String),
    #[error("messaging failure on {channel}: {source}")]
    Messaging {
        channel: Address,
        #[source]
        source: MessagingError,
    },
    #[error("could not acquire lock for {channel} within {ttl:?}")]
    LockTimeout { channel: Address, ttl: Duration },
    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub(crate) fn validation(
        update_type: UpdateType,
        channel: Address,
        source: ValidationError,
    ) -> Self {
        EngineError::Validation {
            update_type,
            channel,
            source,
        }
    }
}
