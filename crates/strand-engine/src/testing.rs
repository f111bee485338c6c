//! Shared fixtures for this crate's unit tests.

use alloy_primitives::{Address, B256, U256};

use strand_types::balance::Balance;
use strand_types::channel::{ChannelState, NetworkContext};
use strand_types::signing::ChannelSigner;
use strand_types::transfer::{Transfer, TransferEncodings};

pub fn test_signer(byte: u8) -> ChannelSigner {
    let mut key = [0u8; 32];
    key[31] = byte;
    ChannelSigner::from_bytes(&key.into()).unwrap()
}

pub fn test_channel() -> ChannelState {
    let alice = test_signer(1);
    let bob = test_signer(2);
    ChannelState {
        channel_address: Address::repeat_byte(0xcc),
        alice: alice.address(),
        bob: bob.address(),
        alice_identifier: alice.public_identifier().clone(),
        bob_identifier: bob.public_identifier().clone(),
        network_context: NetworkContext {
            chain_id: 1337,
            channel_factory_address: Address::repeat_byte(0xfa),
            transfer_registry_address: Address::repeat_byte(0xe9),
        },
        nonce: 4,
        asset_ids: vec![],
        balances: vec![],
        processed_deposits_a: vec![],
        processed_deposits_b: vec![],
        defund_nonces: vec![],
        timeout: 600,
        merkle_root: B256::ZERO,
        latest_update: None,
        in_dispute: false,
    }
}

/// A channel holding one asset with the given `[alice, bob]` amounts, with
/// processed deposits matching the balance.
pub fn channel_with_asset(asset_id: Address, amounts: [U256; 2]) -> ChannelState {
    let mut channel = test_channel();
    channel.asset_ids = vec![asset_id];
    channel.balances = vec![Balance {
        to: channel.participants(),
        amount: amounts,
    }];
    channel.processed_deposits_a = vec![amounts[0]];
    channel.processed_deposits_b = vec![amounts[1]];
    channel.defund_nonces = vec![1];
    channel
}

/// A hashlock-style transfer from Alice to Bob locking `amount`.
pub fn hashlock_transfer(channel: &ChannelState, amount: U256) -> Transfer {
    Transfer {
        transfer_id: B256::repeat_byte(0x1d),
        channel_address: channel.channel_address,
        chain_id: channel.network_context.chain_id,
        channel_factory_address: channel.network_context.channel_factory_address,
        initiator: channel.alice,
        responder: channel.bob,
        channel_nonce: channel.nonce + 1,
        transfer_definition: Address::repeat_byte(0xde),
        transfer_encodings: TransferEncodings {
            state: "tuple(bytes32 lockHash, uint256 expiry)".into(),
            resolver: "tuple(bytes32 preImage)".into(),
        },
        balance: Balance {
            to: [channel.alice, channel.bob],
            amount: [amount, U256::ZERO],
        },
        asset_id: channel.asset_ids.first().copied().unwrap_or(Address::ZERO),
        transfer_timeout: 60,
        initial_state_hash: B256::repeat_byte(0x15),
        transfer_state: serde_json::json!({
            "lockHash": format!("{}", B256::repeat_byte(9)),
            "expiry": "0",
        }),
        transfer_resolver: None,
        meta: serde_json::Value::Null,
        in_dispute: false,
    }
}
