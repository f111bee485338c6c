//! Chain-boundary error taxonomy.

use alloy_primitives::Address;
use strand_types::codec::CodecError;

/// Errors surfaced by the chain reader and sender.
///
/// Only [`ChainError::Rpc`] is transient; everything else reflects either a
/// contract-level rejection or a local misconfiguration and is never retried.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// No provider configured for the requested chain.
    #[error("chain {0} is not configured")]
    UnsupportedChain(u64),
    /// Transport-level RPC failure. Retryable.
    #[error("rpc transport failure: {0}")]
    Rpc(String),
    /// The contract call reverted or returned malformed data.
    #[error("contract call failed: {0}")]
    ContractCall(String),
    /// The transfer definition is not listed in the registry.
    #[error("transfer definition {definition} is not registered on chain {chain_id}")]
    TransferNotRegistered { definition: Address, chain_id: u64 },
    /// Encoding a payload for a contract call failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A bounded-retry read ran out of attempts.
    #[error("{op} failed after {attempts} attempts: {last}")]
    MaxRetries {
        op: &'static str,
        attempts: u32,
        #[source]
        last: Box<ChainError>,
    },
}

impl ChainError {
    /// Whether the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Rpc(_))
    }
}

impl From<alloy_contract::Error> for ChainError {
    fn from(error: alloy_contract::Error) -> Self {
        match error {
            alloy_contract::Error::TransportError(e) => ChainError::Rpc(e.to_string()),
            other => ChainError::ContractCall(other.to_string()),
        }
    }
}

impl From<alloy_transport::TransportError> for ChainError {
    fn from(error: alloy_transport::TransportError) -> Self {
        ChainError::Rpc(error.to_string())
    }
}
