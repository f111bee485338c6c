//! End-to-end protocol scenarios over two connected engines.

mod common;

use alloy_primitives::{Address, B256, Bytes, U256};
use serde_json::Value;
use std::sync::atomic::Ordering;

use common::*;
use strand_engine::{EngineError, ValidationError};
use strand_store::EngineStore;
use strand_types::balance::Balance;
use strand_types::codec;
use strand_types::commitment::{WithdrawCommitment, hash_channel_commitment};
use strand_types::protocol::{ProtocolErrorReason, ProtocolUpdate};
use strand_types::signing::verify_commitment_signature;
use strand_types::transfer::TransferFilter;
use strand_types::update::{CreateParams, DepositParams, ResolveParams, SetupParams};
use strand_types::{ChannelState, Transfer};

fn setup_params(h: &Harness) -> SetupParams {
    SetupParams {
        counterparty_identifier: h.bob.identifier(),
        timeout: 600,
        network_context: network_context(),
        meta: Value::Null,
    }
}

async fn setup_channel(h: &Harness) -> ChannelState {
    h.alice.engine.setup(setup_params(h)).await.unwrap()
}

/// Deploys the channel contract and reconciles a cumulative Alice deposit.
async fn deposit_alice(h: &Harness, channel: &ChannelState, total: u64) -> ChannelState {
    h.reader.deploy(channel.channel_address);
    h.reader
        .set_alice_deposits(channel.channel_address, Address::ZERO, U256::from(total));
    h.alice
        .engine
        .deposit(DepositParams {
            channel_address: channel.channel_address,
            asset_id: Address::ZERO,
            meta: Value::Null,
        })
        .await
        .unwrap()
}

fn create_params(channel: &ChannelState, amount: u64) -> CreateParams {
    CreateParams {
        channel_address: channel.channel_address,
        asset_id: Address::ZERO,
        balance: Balance {
            to: [channel.alice, channel.bob],
            amount: [U256::from(amount), U256::ZERO],
        },
        transfer_definition: HASHLOCK_DEFINITION,
        transfer_initial_state: hashlock_state(),
        timeout: 60,
        meta: Value::Null,
    }
}

async fn create_hashlock(h: &Harness, channel: &ChannelState, amount: u64) -> (ChannelState, Transfer) {
    h.alice
        .engine
        .create_transfer(create_params(channel, amount))
        .await
        .unwrap()
}

fn amounts(channel: &ChannelState) -> [U256; 2] {
    channel.balances[0].amount
}

/// Both signatures on the latest durable update verify against the state
/// commitment.
fn assert_durably_signed(state: &ChannelState) {
    let hash = hash_channel_commitment(state);
    let latest = state.latest_update.as_ref().expect("durable state has a latest update");
    verify_commitment_signature(hash, latest.alice_signature.as_ref().unwrap(), state.alice)
        .expect("alice signature");
    verify_commitment_signature(hash, latest.bob_signature.as_ref().unwrap(), state.bob)
        .expect("bob signature");
}

async fn stored(peer: &Peer, channel: Address) -> ChannelState {
    peer.store.get_channel_state(channel).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_setup_deposit_transfer_roundtrip() {
    let h = harness();

    // Setup on chain 1337.
    let channel = setup_channel(&h).await;
    assert_eq!(channel.nonce, 1);
    assert_eq!(channel.alice, h.alice.signer.address());
    assert_eq!(channel.bob, h.bob.signer.address());
    assert!(channel.asset_ids.is_empty());
    assert_eq!(channel.merkle_root, B256::ZERO);
    assert_durably_signed(&channel);
    assert_eq!(stored(&h.bob, channel.channel_address).await, channel);

    // Alice deposits 10 of asset zero on-chain (cumulative total 10).
    let channel = deposit_alice(&h, &channel, 10).await;
    assert_eq!(channel.nonce, 2);
    assert_eq!(amounts(&channel), [U256::from(10u64), U256::ZERO]);
    assert_eq!(channel.processed_deposits_a, vec![U256::from(10u64)]);
    assert_durably_signed(&channel);
    assert_eq!(stored(&h.bob, channel.channel_address).await, channel);

    // Alice locks a hashlock transfer of 3 to Bob.
    let (channel, transfer) = create_hashlock(&h, &channel, 3).await;
    assert_eq!(channel.nonce, 3);
    assert_eq!(amounts(&channel), [U256::from(7u64), U256::ZERO]);
    assert_ne!(channel.merkle_root, B256::ZERO);
    assert_eq!(
        transfer.initial_state_hash,
        codec::hash_transfer_state(&hashlock_state(), HASHLOCK_STATE_ENCODING).unwrap()
    );
    for peer in [&h.alice, &h.bob] {
        let active = peer
            .store
            .get_active_transfers(channel.channel_address)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].transfer_id, transfer.transfer_id);
    }
    assert_durably_signed(&channel);

    // Bob resolves with the correct preimage.
    let (channel, resolved) = h
        .bob
        .engine
        .resolve_transfer(ResolveParams {
            channel_address: channel.channel_address,
            transfer_id: transfer.transfer_id,
            transfer_resolver: hashlock_resolver(preimage()),
            meta: Value::Null,
        })
        .await
        .unwrap();
    assert_eq!(channel.nonce, 4);
    assert_eq!(amounts(&channel), [U256::from(7u64), U256::from(3u64)]);
    assert_eq!(channel.merkle_root, B256::ZERO);
    assert!(resolved.is_resolved());
    assert_durably_signed(&channel);

    // Gone from active, present in history, on both replicas.
    for peer in [&h.alice, &h.bob] {
        assert!(
            peer.store
                .get_active_transfers(channel.channel_address)
                .await
                .unwrap()
                .is_empty()
        );
        let history = peer
            .store
            .get_transfers(&TransferFilter {
                transfer_id: Some(transfer.transfer_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_resolved());
    }
    assert_eq!(stored(&h.alice, channel.channel_address).await, channel);
    assert_eq!(stored(&h.bob, channel.channel_address).await, channel);
}

#[tokio::test]
async fn test_stale_outbound_syncs_and_retries_once() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;
    let address = channel.channel_address;

    // Remember Alice's nonce-2 replica, then let Bob drive nonce 3.
    let alice_snapshot = stored(&h.alice, address).await;
    h.bob
        .engine
        .deposit(DepositParams {
            channel_address: address,
            asset_id: Address::ZERO,
            meta: Value::Null,
        })
        .await
        .unwrap();
    assert_eq!(stored(&h.bob, address).await.nonce, 3);

    // Alice misses it: roll her replica back to nonce 2.
    h.alice
        .store
        .save_channel_state_and_transfers(&alice_snapshot, &[])
        .await
        .unwrap();

    // New on-chain funds land; Alice proposes what she believes is nonce 3.
    h.reader
        .set_alice_deposits(address, Address::ZERO, U256::from(15u64));
    let sent_before = h.alice.messenger.sent();
    let channel = h
        .alice
        .engine
        .deposit(DepositParams {
            channel_address: address,
            asset_id: Address::ZERO,
            meta: Value::Null,
        })
        .await
        .unwrap();

    // One rejected attempt, one sync, one successful retry.
    assert_eq!(h.alice.messenger.sent() - sent_before, 2);
    assert_eq!(channel.nonce, 4);
    assert_eq!(amounts(&channel), [U256::from(15u64), U256::ZERO]);
    assert_eq!(stored(&h.alice, address).await, stored(&h.bob, address).await);
    assert_durably_signed(&channel);
}

#[tokio::test]
async fn test_nonce_gap_of_three_requires_restore() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;
    let address = channel.channel_address;

    let mut update = channel.latest_update.clone().unwrap();
    update.nonce = channel.nonce + 3;
    let reply = h
        .bob
        .engine
        .handle_protocol_update(
            &h.alice.identifier(),
            ProtocolUpdate {
                update,
                previous_update: None,
            },
        )
        .await;

    let error = reply.unwrap_err();
    assert_eq!(error.reason, ProtocolErrorReason::RestoreNeeded);
    // Nothing persisted.
    assert_eq!(stored(&h.bob, address).await.nonce, channel.nonce);
}

#[tokio::test]
async fn test_reapplying_the_same_update_is_stale() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;

    // Bob already holds this nonce; a second delivery must be rejected as
    // stale, carrying his latest update for sync.
    let latest = channel.latest_update.clone().unwrap();
    let reply = h
        .bob
        .engine
        .handle_protocol_update(
            &h.alice.identifier(),
            ProtocolUpdate {
                update: latest.clone(),
                previous_update: None,
            },
        )
        .await;
    let error = reply.unwrap_err();
    assert_eq!(error.reason, ProtocolErrorReason::StaleUpdate);
    assert_eq!(error.latest_update.unwrap().nonce, latest.nonce);
}

#[tokio::test]
async fn test_concurrent_deposits_serialize_on_the_lock() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;
    let address = channel.channel_address;
    h.reader
        .set_alice_deposits(address, Address::ZERO, U256::from(12u64));

    let params = DepositParams {
        channel_address: address,
        asset_id: Address::ZERO,
        meta: Value::Null,
    };
    let (first, second) = tokio::join!(
        h.alice.engine.deposit(params.clone()),
        h.alice.engine.deposit(params),
    );

    // Exactly one wins; the loser observed the advanced nonce after taking
    // the lock.
    let (winner, loser) = match (first, second) {
        (Ok(state), Err(error)) => (state, error),
        (Err(error), Ok(state)) => (state, error),
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert!(matches!(loser, EngineError::StaleUpdate { .. }), "{loser}");
    assert_eq!(winner.nonce, 3);
    assert_eq!(amounts(&winner), [U256::from(12u64), U256::ZERO]);
    // Asset ids stay deduplicated in both outcomes.
    assert_eq!(winner.asset_ids, vec![Address::ZERO]);
    assert_eq!(stored(&h.bob, address).await, winner);
}

#[tokio::test]
async fn test_create_rejected_by_onchain_predicate() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;
    h.reader.create_result.store(false, Ordering::SeqCst);

    let sent_before = h.alice.messenger.sent();
    let error = h
        .alice
        .engine
        .create_transfer(create_params(&channel, 3))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        EngineError::Validation {
            source: ValidationError::CreateRejected,
            ..
        }
    ));
    // No message reached the peer, no transfer was persisted anywhere.
    assert_eq!(h.alice.messenger.sent(), sent_before);
    for peer in [&h.alice, &h.bob] {
        assert!(
            peer.store
                .get_transfers(&TransferFilter::default())
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(stored(peer, channel.channel_address).await.nonce, channel.nonce);
    }
}

#[tokio::test]
async fn test_resolver_with_mismatched_total_is_rejected() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;
    let (channel, transfer) = create_hashlock(&h, &channel, 3).await;

    // The definition "returns" more than the locked balance.
    *h.reader.resolve_override.lock().unwrap() = Some(Balance {
        to: [channel.alice, channel.bob],
        amount: [U256::ZERO, U256::from(4u64)],
    });

    let sent_before = h.bob.messenger.sent();
    let error = h
        .bob
        .engine
        .resolve_transfer(ResolveParams {
            channel_address: channel.channel_address,
            transfer_id: transfer.transfer_id,
            transfer_resolver: hashlock_resolver(preimage()),
            meta: Value::Null,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        EngineError::Validation {
            source: ValidationError::InvalidResolve { .. },
            ..
        }
    ));
    // No counterparty round-trip happened.
    assert_eq!(h.bob.messenger.sent(), sent_before);
    assert_eq!(
        stored(&h.bob, channel.channel_address).await.nonce,
        channel.nonce
    );
}

#[tokio::test]
async fn test_undeployed_channel_credits_bob() {
    let h = harness();
    let channel = setup_channel(&h).await;
    // Plain send of 5 to the (undeployed) channel address.
    h.reader
        .onchain_balances
        .insert((Address::ZERO, channel.channel_address), U256::from(5u64));

    let channel = h
        .alice
        .engine
        .deposit(DepositParams {
            channel_address: channel.channel_address,
            asset_id: Address::ZERO,
            meta: Value::Null,
        })
        .await
        .unwrap();
    assert_eq!(amounts(&channel), [U256::ZERO, U256::from(5u64)]);
    assert_eq!(channel.processed_deposits_a, vec![U256::ZERO]);
    assert_eq!(channel.processed_deposits_b, vec![U256::from(5u64)]);
}

#[tokio::test]
async fn test_empty_resolver_reverts_to_initiator() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;
    let (channel, transfer) = create_hashlock(&h, &channel, 3).await;
    assert_eq!(amounts(&channel), [U256::from(7u64), U256::ZERO]);

    let (channel, resolved) = h
        .bob
        .engine
        .resolve_transfer(ResolveParams {
            channel_address: channel.channel_address,
            transfer_id: transfer.transfer_id,
            transfer_resolver: Value::Null,
            meta: Value::Null,
        })
        .await
        .unwrap();
    // The locked balance went back to Alice.
    assert_eq!(amounts(&channel), [U256::from(10u64), U256::ZERO]);
    assert_eq!(channel.merkle_root, B256::ZERO);
    assert_eq!(resolved.transfer_resolver, Some(Value::Null));
}

#[tokio::test]
async fn test_transfer_timeout_above_channel_is_rejected() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let channel = deposit_alice(&h, &channel, 10).await;

    let mut params = create_params(&channel, 3);
    params.timeout = channel.timeout + 1;
    let error = h.alice.engine.create_transfer(params).await.unwrap_err();
    assert!(matches!(
        error,
        EngineError::Validation {
            source: ValidationError::TransferTimeoutAboveChannel { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_duplicate_asset_ids_merge_on_load() {
    let h = harness();
    let channel = setup_channel(&h).await;
    let address = channel.channel_address;

    // A legacy record with the same asset listed twice.
    let mut legacy = channel.clone();
    legacy.asset_ids = vec![Address::ZERO, Address::ZERO];
    legacy.balances = vec![
        Balance {
            to: legacy.participants(),
            amount: [U256::from(1u64), U256::from(2u64)],
        },
        Balance {
            to: legacy.participants(),
            amount: [U256::from(3u64), U256::from(4u64)],
        },
    ];
    legacy.processed_deposits_a = vec![U256::from(1u64), U256::from(3u64)];
    legacy.processed_deposits_b = vec![U256::from(2u64), U256::from(4u64)];
    legacy.defund_nonces = vec![1, 5];
    for peer in [&h.alice, &h.bob] {
        peer.store
            .save_channel_state_and_transfers(&legacy, &[])
            .await
            .unwrap();
    }

    // Chain totals match the merged processed totals: nothing pending.
    h.reader.deploy(address);
    h.reader
        .set_alice_deposits(address, Address::ZERO, U256::from(4u64));
    h.reader
        .set_bob_deposits(address, Address::ZERO, U256::from(6u64));

    let channel = h
        .alice
        .engine
        .deposit(DepositParams {
            channel_address: address,
            asset_id: Address::ZERO,
            meta: Value::Null,
        })
        .await
        .unwrap();
    assert_eq!(channel.asset_ids, vec![Address::ZERO]);
    assert_eq!(amounts(&channel), [U256::from(4u64), U256::from(6u64)]);
    assert_eq!(channel.defund_nonces, vec![5]);
    assert_eq!(stored(&h.bob, address).await, channel);
}

#[tokio::test]
async fn test_withdrawal_commitment_sign_and_store() {
    let h = harness();
    let channel = setup_channel(&h).await;

    let commitment = WithdrawCommitment {
        channel_address: channel.channel_address,
        alice: channel.alice,
        bob: channel.bob,
        recipient: channel.alice,
        asset_id: Address::ZERO,
        amount: U256::from(2u64),
        nonce: channel.nonce,
        call_to: Address::ZERO,
        call_data: Bytes::new(),
        alice_signature: None,
        bob_signature: None,
        transaction_hash: None,
    };
    let signed = h
        .alice
        .engine
        .sign_withdrawal_commitment(commitment)
        .await
        .unwrap();
    verify_commitment_signature(
        signed.hash_to_sign(),
        signed.alice_signature.as_ref().unwrap(),
        channel.alice,
    )
    .unwrap();

    let transfer_id = B256::repeat_byte(0x77);
    h.alice
        .engine
        .save_withdrawal_commitment(transfer_id, &signed)
        .await
        .unwrap();
    let loaded = h
        .alice
        .store
        .get_withdrawal_commitment(transfer_id)
        .await
        .unwrap();
    assert_eq!(loaded, Some(signed.clone()));
    assert!(
        !h.alice
            .engine
            .withdrawal_recorded(&signed, CHAIN_ID)
            .await
            .unwrap()
    );
}
