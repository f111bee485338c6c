//! Channel updates and proposal parameters.
//!
//! A [`ChannelUpdate`] is a single transition on a channel. Its `details`
//! vary by [`UpdateType`] and are modeled as a tagged enum rather than a
//! free-form map, so malformed updates fail at the serde boundary instead of
//! deep inside validation.

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::balance::{Balance, u256_decimal};
use crate::channel::NetworkContext;
use crate::identifiers::PublicIdentifier;
use crate::transfer::TransferEncodings;

/// The four update types of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateType {
    Setup,
    Deposit,
    Create,
    Resolve,
}

impl std::fmt::Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateType::Setup => "setup",
            UpdateType::Deposit => "deposit",
            UpdateType::Create => "create",
            UpdateType::Resolve => "resolve",
        };
        f.write_str(s)
    }
}

/// Per-type payload of a [`ChannelUpdate`].
///
/// Untagged on the wire: the variants have disjoint required fields, and the
/// sibling `type` field is cross-checked against the decoded variant by
/// [`ChannelUpdate::details_match_type`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateDetails {
    Setup(SetupUpdateDetails),
    Create(CreateUpdateDetails),
    Resolve(ResolveUpdateDetails),
    Deposit(DepositUpdateDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupUpdateDetails {
    pub network_context: NetworkContext,
    /// Channel-wide dispute window in seconds.
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositUpdateDetails {
    /// Cumulative on-chain deposit total for Alice at proposal time.
    #[serde(with = "u256_decimal")]
    pub total_deposits_alice: U256,
    /// Cumulative on-chain deposit total for Bob at proposal time.
    #[serde(with = "u256_decimal")]
    pub total_deposits_bob: U256,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUpdateDetails {
    pub transfer_id: B256,
    /// The transfer's initial locked balance.
    pub balance: Balance,
    pub transfer_definition: Address,
    pub transfer_timeout: u64,
    pub transfer_initial_state: Value,
    pub transfer_encodings: TransferEncodings,
    /// Merkle root after adding the transfer.
    pub merkle_root: B256,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveUpdateDetails {
    pub transfer_id: B256,
    pub transfer_definition: Address,
    /// `Null` encodes the cooperative cancellation: the locked balance
    /// reverts to the transfer initiator.
    pub transfer_resolver: Value,
    /// Merkle root after removing the transfer.
    pub merkle_root: B256,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

impl UpdateDetails {
    /// The update type this payload belongs to.
    pub fn update_type(&self) -> UpdateType {
        match self {
            UpdateDetails::Setup(_) => UpdateType::Setup,
            UpdateDetails::Deposit(_) => UpdateType::Deposit,
            UpdateDetails::Create(_) => UpdateType::Create,
            UpdateDetails::Resolve(_) => UpdateType::Resolve,
        }
    }
}

/// A single state transition, in flight or durably signed.
///
/// `nonce` is the nonce the channel has *after* applying this update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    pub channel_address: Address,
    pub from_identifier: PublicIdentifier,
    pub to_identifier: PublicIdentifier,
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub nonce: u64,
    /// The post-update channel balance for `asset_id`.
    pub balance: Balance,
    pub asset_id: Address,
    pub details: UpdateDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alice_signature: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bob_signature: Option<Bytes>,
}

impl ChannelUpdate {
    /// Whether the `type` field agrees with the decoded `details` variant.
    pub fn details_match_type(&self) -> bool {
        self.details.update_type() == self.update_type
    }

    /// Whether both participants' signatures are attached.
    pub fn is_double_signed(&self) -> bool {
        self.alice_signature.is_some() && self.bob_signature.is_some()
    }
}

/// Parameters for a locally proposed update, by type.
#[derive(Debug, Clone)]
pub enum UpdateParams {
    Setup(SetupParams),
    Deposit(DepositParams),
    Create(CreateParams),
    Resolve(ResolveParams),
}

impl UpdateParams {
    pub fn update_type(&self) -> UpdateType {
        match self {
            UpdateParams::Setup(_) => UpdateType::Setup,
            UpdateParams::Deposit(_) => UpdateType::Deposit,
            UpdateParams::Create(_) => UpdateType::Create,
            UpdateParams::Resolve(_) => UpdateType::Resolve,
        }
    }

    /// The channel the proposal addresses; `None` for setup, whose address is
    /// derived from the factory.
    pub fn channel_address(&self) -> Option<Address> {
        match self {
            UpdateParams::Setup(_) => None,
            UpdateParams::Deposit(p) => Some(p.channel_address),
            UpdateParams::Create(p) => Some(p.channel_address),
            UpdateParams::Resolve(p) => Some(p.channel_address),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetupParams {
    pub counterparty_identifier: PublicIdentifier,
    /// Channel-wide dispute window in seconds.
    pub timeout: u64,
    pub network_context: NetworkContext,
    pub meta: Value,
}

#[derive(Debug, Clone)]
pub struct DepositParams {
    pub channel_address: Address,
    pub asset_id: Address,
    pub meta: Value,
}

#[derive(Debug, Clone)]
pub struct CreateParams {
    pub channel_address: Address,
    pub asset_id: Address,
    /// Initial locked balance of the transfer.
    pub balance: Balance,
    pub transfer_definition: Address,
    pub transfer_initial_state: Value,
    /// Transfer-specific dispute window; must not exceed the channel's.
    pub timeout: u64,
    pub meta: Value,
}

#[derive(Debug, Clone)]
pub struct ResolveParams {
    pub channel_address: Address,
    pub transfer_id: B256,
    /// `Null` requests cooperative cancellation.
    pub transfer_resolver: Value,
    pub meta: Value,
}
