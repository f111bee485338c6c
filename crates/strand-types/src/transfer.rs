//! Conditional transfers locked inside a channel.

use alloy_primitives::{Address, B256, Bytes};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::balance::Balance;

/// ABI-style encoding strings for a transfer's state and resolver payloads.
///
/// On the wire this is the two-element array `[stateEncoding,
/// resolverEncoding]`, matching the registry's on-chain representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEncodings {
    pub state: String,
    pub resolver: String,
}

impl Serialize for TransferEncodings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [&self.state, &self.resolver].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TransferEncodings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [state, resolver]: [String; 2] = Deserialize::deserialize(deserializer)?;
        if state.is_empty() {
            return Err(D::Error::custom("empty state encoding"));
        }
        Ok(TransferEncodings { state, resolver })
    }
}

/// A conditional transfer and everything needed to dispute it on-chain.
///
/// Created by a `create` update, removed from the active set by a `resolve`
/// update and retained in history with its resolver populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// Random 32-byte identifier assigned at creation.
    pub transfer_id: B256,
    pub channel_address: Address,
    pub chain_id: u64,
    pub channel_factory_address: Address,
    /// Address of the participant who locked the transfer.
    pub initiator: Address,
    pub responder: Address,
    /// The channel nonce at which the transfer was created.
    pub channel_nonce: u64,
    /// On-chain transfer-definition contract governing the unlock predicate.
    pub transfer_definition: Address,
    pub transfer_encodings: TransferEncodings,
    /// The locked balance.
    pub balance: Balance,
    pub asset_id: Address,
    /// Transfer-specific dispute window in seconds.
    pub transfer_timeout: u64,
    /// keccak of the ABI-encoded initial state; the merkle leaf.
    pub initial_state_hash: B256,
    /// Opaque structured state initialising the on-chain predicate.
    pub transfer_state: Value,
    /// Populated only once resolved. `Some(Null)` records a cooperative
    /// cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_resolver: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
    pub in_dispute: bool,
}

impl Transfer {
    /// Whether a `resolve` update has been applied to this transfer.
    pub fn is_resolved(&self) -> bool {
        self.transfer_resolver.is_some()
    }
}

/// Metadata of a transfer definition approved in the on-chain registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredTransfer {
    pub name: String,
    pub definition: Address,
    pub state_encoding: String,
    pub resolver_encoding: String,
    /// ABI-encoded resolver value the definition treats as a cancellation.
    pub encoded_cancel: Bytes,
}

impl RegisteredTransfer {
    pub fn encodings(&self) -> TransferEncodings {
        TransferEncodings {
            state: self.state_encoding.clone(),
            resolver: self.resolver_encoding.clone(),
        }
    }
}

/// Filter for historical transfer queries. All populated fields must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferFilter {
    pub channel_address: Option<Address>,
    pub transfer_id: Option<B256>,
    pub transfer_definition: Option<Address>,
    /// `Some(true)` restricts to unresolved transfers, `Some(false)` to
    /// resolved ones.
    pub active: Option<bool>,
}

impl TransferFilter {
    pub fn matches(&self, transfer: &Transfer) -> bool {
        if let Some(channel) = self.channel_address
            && transfer.channel_address != channel
        {
            return false;
        }
        if let Some(id) = self.transfer_id
            && transfer.transfer_id != id
        {
            return false;
        }
        if let Some(definition) = self.transfer_definition
            && transfer.transfer_definition != definition
        {
            return false;
        }
        if let Some(active) = self.active
            && transfer.is_resolved() == active
        {
            return false;
        }
        true
    }
}
