//! The off-chain channel record.
//!
//! [`ChannelState`] is the authoritative shared state of a two-party channel:
//! immutable identity (participants, network context), a strictly monotonic
//! nonce, per-asset parallel arrays, the merkle commitment to active
//! transfers, and the most recent bilaterally signed update.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::balance::{Balance, u256_decimal};
use crate::identifiers::PublicIdentifier;
use crate::update::ChannelUpdate;

/// The chain-level context a channel is anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Address of the channel factory used to derive and deploy channels.
    pub channel_factory_address: Address,
    /// Address of the on-chain transfer registry.
    pub transfer_registry_address: Address,
}

/// The two fixed roles in a channel.
///
/// Alice is the initiator role: she deploys the channel contract and deposits
/// through the factory. Bob is the responder and may deposit by plain send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Alice,
    Bob,
}

/// The authoritative off-chain record of a channel.
///
/// The parallel arrays `balances`, `processed_deposits_a`,
/// `processed_deposits_b`, and `defund_nonces` are all indexed by position in
/// `asset_ids`; every mutation keeps their lengths equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub channel_address: Address,
    pub alice: Address,
    pub bob: Address,
    pub alice_identifier: PublicIdentifier,
    pub bob_identifier: PublicIdentifier,
    pub network_context: NetworkContext,
    /// Strictly increases by one per applied update.
    pub nonce: u64,
    /// Every asset ever transacted on this channel, deduplicated.
    pub asset_ids: Vec<Address>,
    pub balances: Vec<Balance>,
    /// Cumulative on-chain deposits already reconciled into balances, per asset.
    #[serde(with = "u256_decimal::vec")]
    pub processed_deposits_a: Vec<U256>,
    #[serde(with = "u256_decimal::vec")]
    pub processed_deposits_b: Vec<U256>,
    pub defund_nonces: Vec<u64>,
    /// Channel-wide dispute window in seconds.
    pub timeout: u64,
    /// Root of the merkle tree over active-transfer initial-state hashes.
    pub merkle_root: B256,
    /// Most recent update carrying both parties' signatures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_update: Option<ChannelUpdate>,
    pub in_dispute: bool,
}

impl ChannelState {
    /// Participant addresses in role order `[alice, bob]`.
    pub fn participants(&self) -> [Address; 2] {
        [self.alice, self.bob]
    }

    pub fn is_participant(&self, address: Address) -> bool {
        address == self.alice || address == self.bob
    }

    /// The role of the given participant address, if any.
    pub fn role_of(&self, address: Address) -> Option<ChannelRole> {
        if address == self.alice {
            Some(ChannelRole::Alice)
        } else if address == self.bob {
            Some(ChannelRole::Bob)
        } else {
            None
        }
    }

    /// The role of the given identifier, if it belongs to this channel.
    pub fn role_of_identifier(&self, identifier: &PublicIdentifier) -> Option<ChannelRole> {
        if identifier == &self.alice_identifier {
            Some(ChannelRole::Alice)
        } else if identifier == &self.bob_identifier {
            Some(ChannelRole::Bob)
        } else {
            None
        }
    }

    /// The counterparty identifier for the given local identifier.
    pub fn counterparty_of(&self, identifier: &PublicIdentifier) -> Option<&PublicIdentifier> {
        match self.role_of_identifier(identifier)? {
            ChannelRole::Alice => Some(&self.bob_identifier),
            ChannelRole::Bob => Some(&self.alice_identifier),
        }
    }

    /// Index of an asset in the parallel arrays.
    pub fn asset_index(&self, asset_id: Address) -> Option<usize> {
        self.asset_ids.iter().position(|a| *a == asset_id)
    }

    /// The channel balance for an asset, or an empty balance if the asset has
    /// not been transacted yet.
    pub fn balance_for(&self, asset_id: Address) -> Balance {
        match self.asset_index(asset_id) {
            Some(idx) => self.balances[idx].clone(),
            None => Balance::empty(self.participants()),
        }
    }

    /// Merges duplicate entries in `asset_ids`, summing balances and
    /// processed-deposit totals and keeping the largest defund nonce.
    ///
    /// Duplicates appear in records persisted before asset ids were stored in
    /// canonical form. The merge runs once per load; returns `true` when the
    /// record was rewritten.
    pub fn normalize_asset_ids(&mut self) -> bool {
        let mut merged_ids: Vec<Address> = Vec::with_capacity(self.asset_ids.len());
        let mut merged_balances: Vec<Balance> = Vec::with_capacity(self.balances.len());
        let mut merged_a: Vec<U256> = Vec::with_capacity(self.processed_deposits_a.len());
        let mut merged_b: Vec<U256> = Vec::with_capacity(self.processed_deposits_b.len());
        let mut merged_defund: Vec<u64> = Vec::with_capacity(self.defund_nonces.len());
        let mut changed = false;

        for (idx, asset) in self.asset_ids.iter().enumerate() {
            match merged_ids.iter().position(|a| a == asset) {
                None => {
                    merged_ids.push(*asset);
                    merged_balances.push(self.balances[idx].clone());
                    merged_a.push(self.processed_deposits_a[idx]);
                    merged_b.push(self.processed_deposits_b[idx]);
                    merged_defund.push(self.defund_nonces[idx]);
                }
                Some(at) => {
                    changed = true;
                    let dup = &self.balances[idx];
                    merged_balances[at].amount[0] += dup.amount[0];
                    merged_balances[at].amount[1] += dup.amount[1];
                    merged_a[at] += self.processed_deposits_a[idx];
                    merged_b[at] += self.processed_deposits_b[idx];
                    merged_defund[at] = merged_defund[at].max(self.defund_nonces[idx]);
                }
            }
        }

        if changed {
            self.asset_ids = merged_ids;
            self.balances = merged_balances;
            self.processed_deposits_a = merged_a;
            self.processed_deposits_b = merged_b;
            self.defund_nonces = merged_defund;
        }
        changed
    }
}
