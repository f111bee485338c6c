//! Shared fixtures for this crate's unit tests.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;
use serde_json::json;

use crate::balance::Balance;
use crate::channel::{ChannelState, NetworkContext};
use crate::identifiers::PublicIdentifier;
use crate::signing::ChannelSigner;
use crate::transfer::{Transfer, TransferEncodings};
use crate::update::{
    ChannelUpdate, CreateUpdateDetails, DepositUpdateDetails, ResolveUpdateDetails,
    SetupUpdateDetails, UpdateDetails, UpdateType,
};

pub fn test_signer(byte: u8) -> ChannelSigner {
    let mut key = [0u8; 32];
    key[31] = byte;
    ChannelSigner::new(PrivateKeySigner::from_bytes(&key.into()).unwrap())
}

pub fn test_identifier(byte: u8) -> PublicIdentifier {
    test_signer(byte).public_identifier().clone()
}

pub fn network_context_fixture() -> NetworkContext {
    NetworkContext {
        chain_id: 1337,
        channel_factory_address: Address::repeat_byte(0xfa),
        transfer_registry_address: Address::repeat_byte(0xe9),
    }
}

pub fn channel_fixture() -> ChannelState {
    let alice = test_identifier(1);
    let bob = test_identifier(2);
    ChannelState {
        channel_address: Address::repeat_byte(0xcc),
        alice: alice.address(),
        bob: bob.address(),
        alice_identifier: alice,
        bob_identifier: bob,
        network_context: network_context_fixture(),
        nonce: 1,
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

pub fn transfer_fixture() -> Transfer {
    let channel = channel_fixture();
    Transfer {
        transfer_id: B256::repeat_byte(0x1d),
        channel_address: channel.channel_address,
        chain_id: channel.network_context.chain_id,
        channel_factory_address: channel.network_context.channel_factory_address,
        initiator: channel.alice,
        responder: channel.bob,
        channel_nonce: 3,
        transfer_definition: Address::repeat_byte(0xde),
        transfer_encodings: TransferEncodings {
            state: "tuple(bytes32 lockHash, uint256 expiry)".into(),
            resolver: "tuple(bytes32 preImage)".into(),
        },
        balance: Balance {
            to: [channel.alice, channel.bob],
            amount: [U256::from(3u64), U256::ZERO],
        },
        asset_id: Address::ZERO,
        transfer_timeout: 60,
        initial_state_hash: B256::repeat_byte(0x15),
        transfer_state: json!({ "lockHash": format!("{}", B256::repeat_byte(9)), "expiry": "0" }),
        transfer_resolver: None,
        meta: serde_json::Value::Null,
        in_dispute: false,
    }
}

pub fn update_fixture(update_type: UpdateType) -> ChannelUpdate {
    let channel = channel_fixture();
    let details = match update_type {
        UpdateType::Setup => UpdateDetails::Setup(SetupUpdateDetails {
            network_context: channel.network_context.clone(),
            timeout: channel.timeout,
            meta: serde_json::Value::Null,
        }),
        UpdateType::Deposit => UpdateDetails::Deposit(DepositUpdateDetails {
            total_deposits_alice: U256::from(10u64),
            total_deposits_bob: U256::ZERO,
            meta: serde_json::Value::Null,
        }),
        UpdateType::Create => {
            let transfer = transfer_fixture();
            UpdateDetails::Create(CreateUpdateDetails {
                transfer_id: transfer.transfer_id,
                balance: transfer.balance.clone(),
                transfer_definition: transfer.transfer_definition,
                transfer_timeout: transfer.transfer_timeout,
                transfer_initial_state: transfer.transfer_state.clone(),
                transfer_encodings: transfer.transfer_encodings.clone(),
                merkle_root: B256::repeat_byte(0x88),
                meta: serde_json::Value::Null,
            })
        }
        UpdateType::Resolve => {
            let transfer = transfer_fixture();
            UpdateDetails::Resolve(ResolveUpdateDetails {
                transfer_id: transfer.transfer_id,
                transfer_definition: transfer.transfer_definition,
                transfer_resolver: json!({ "preImage": format!("{}", B256::repeat_byte(9)) }),
                merkle_root: B256::ZERO,
                meta: serde_json::Value::Null,
            })
        }
    };
    ChannelUpdate {
        channel_address: channel.channel_address,
        from_identifier: channel.alice_identifier.clone(),
        to_identifier: channel.bob_identifier.clone(),
        update_type,
        nonce: channel.nonce + 1,
        balance: Balance {
            to: channel.participants(),
            amount: [U256::from(10u64), U256::ZERO],
        },
        asset_id: Address::ZERO,
        details,
        alice_signature: Some(Bytes::from(vec![1u8; 65])),
        bob_signature: None,
    }
}
