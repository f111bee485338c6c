//! Commitment encoding and hashing.
//!
//! A commitment is the hash both participants sign to make a state durable.
//! The channel commitment hashes the *core* channel state: the fields the
//! on-chain adjudication logic consumes, excluding the network context, the
//! latest update, and any local bookkeeping. Withdrawals use the same
//! hash-and-sign discipline over a [`WithdrawCommitment`].

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::{SolValue, sol};
use serde::{Deserialize, Serialize};

use crate::balance::u256_decimal;
use crate::channel::ChannelState;
use crate::transfer::Transfer;

sol! {
    /// Two-slot balance as the channel contract stores it.
    struct SolBalance {
        uint256[2] amount;
        address[2] to;
    }

    /// The portion of channel state that is hashed and signed.
    struct CoreChannelState {
        address channelAddress;
        address alice;
        address bob;
        address[] assetIds;
        SolBalance[] balances;
        uint256[] processedDepositsA;
        uint256[] processedDepositsB;
        uint256[] defundNonces;
        uint256 timeout;
        uint256 nonce;
        bytes32 merkleRoot;
    }

    /// The portion of a transfer that on-chain dispute logic consumes.
    struct CoreTransferState {
        address channelAddress;
        bytes32 transferId;
        address transferDefinition;
        address initiator;
        address responder;
        address assetId;
        SolBalance balance;
        uint256 transferTimeout;
        bytes32 initialStateHash;
    }

    /// Withdrawal authorization passed to the channel contract.
    struct WithdrawData {
        address channelAddress;
        address alice;
        address bob;
        address recipient;
        address assetId;
        uint256 amount;
        uint256 nonce;
        address callTo;
        bytes callData;
    }
}

impl From<&crate::balance::Balance> for SolBalance {
    fn from(balance: &crate::balance::Balance) -> Self {
        SolBalance {
            amount: balance.amount,
            to: balance.to,
        }
    }
}

fn core_channel_state(state: &ChannelState) -> CoreChannelState {
    CoreChannelState {
        channelAddress: state.channel_address,
        alice: state.alice,
        bob: state.bob,
        assetIds: state.asset_ids.clone(),
        balances: state.balances.iter().map(SolBalance::from).collect(),
        processedDepositsA: state.processed_deposits_a.clone(),
        processedDepositsB: state.processed_deposits_b.clone(),
        defundNonces: state.defund_nonces.iter().copied().map(U256::from).collect(),
        timeout: U256::from(state.timeout),
        nonce: U256::from(state.nonce),
        merkleRoot: state.merkle_root,
    }
}

/// The channel commitment hash `H(S) = keccak(abi.encode(core(S)))`.
///
/// Independent of the network context, the latest update, and any collected
/// signatures; both participants sign exactly this hash.
pub fn hash_channel_commitment(state: &ChannelState) -> B256 {
    keccak256(core_channel_state(state).abi_encode())
}

/// Hash of a transfer's core state, as used by on-chain dispute membership
/// checks.
pub fn hash_core_transfer_state(transfer: &Transfer) -> B256 {
    let core = CoreTransferState {
        channelAddress: transfer.channel_address,
        transferId: transfer.transfer_id,
        transferDefinition: transfer.transfer_definition,
        initiator: transfer.initiator,
        responder: transfer.responder,
        assetId: transfer.asset_id,
        balance: SolBalance::from(&transfer.balance),
        transferTimeout: U256::from(transfer.transfer_timeout),
        initialStateHash: transfer.initial_state_hash,
    };
    keccak256(core.abi_encode())
}

/// A signed authorization to move funds out of the channel contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawCommitment {
    pub channel_address: Address,
    pub alice: Address,
    pub bob: Address,
    pub recipient: Address,
    pub asset_id: Address,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    /// Channel nonce at which the withdrawal was authorized.
    pub nonce: u64,
    /// Optional call executed by the channel contract with the withdrawal.
    pub call_to: Address,
    pub call_data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alice_signature: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bob_signature: Option<Bytes>,
    /// Hash of the on-chain transaction that executed this withdrawal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
}

impl WithdrawCommitment {
    /// The hash both participants sign to authorize the withdrawal.
    pub fn hash_to_sign(&self) -> B256 {
        keccak256(self.withdraw_data().abi_encode())
    }

    /// The calldata struct for the channel contract's withdrawal entrypoints.
    pub fn withdraw_data(&self) -> WithdrawData {
        WithdrawData {
            channelAddress: self.channel_address,
            alice: self.alice,
            bob: self.bob,
            recipient: self.recipient,
            assetId: self.asset_id,
            amount: self.amount,
            nonce: U256::from(self.nonce),
            callTo: self.call_to,
            callData: self.call_data.clone(),
        }
    }
}
