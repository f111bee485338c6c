//! Deterministic state derivation.
//!
//! Pure functions from `(previous state, update inputs)` to the next channel
//! state. All chain reads happen before these run; both the outbound and the
//! inbound validation paths funnel through the same appliers, which is what
//! makes the two replicas converge bit-for-bit.

use alloy_primitives::{Address, U256};
use serde_json::Value;

use strand_types::balance::Balance;
use strand_types::channel::{ChannelRole, ChannelState};
use strand_types::identifiers::PublicIdentifier;
use strand_types::merkle::active_transfer_root;
use strand_types::transfer::Transfer;
use strand_types::update::SetupUpdateDetails;

use crate::error::ValidationError;

fn role_index(role: ChannelRole) -> usize {
    match role {
        ChannelRole::Alice => 0,
        ChannelRole::Bob => 1,
    }
}

/// The genesis state of a freshly set-up channel.
pub(crate) fn apply_setup(
    channel_address: Address,
    alice: &PublicIdentifier,
    bob: &PublicIdentifier,
    details: &SetupUpdateDetails,
) -> ChannelState {
    ChannelState {
        channel_address,
        alice: alice.address(),
        bob: bob.address(),
        alice_identifier: alice.clone(),
        bob_identifier: bob.clone(),
        network_context: details.network_context.clone(),
        nonce: 1,
        asset_ids: vec![],
        balances: vec![],
        processed_deposits_a: vec![],
        processed_deposits_b: vec![],
        defund_nonces: vec![],
        timeout: details.timeout,
        merkle_root: alloy_primitives::B256::ZERO,
        latest_update: None,
        in_dispute: false,
    }
}

/// Deposit reconciliation: fold pending on-chain deposits into the channel
/// balance for one asset.
///
/// `total_a` / `total_b` are the cumulative on-chain totals read at proposal
/// time; the per-side pending amount is the difference against what this
/// channel has already processed. A cumulative total below the processed
/// total means the proposer and the chain disagree irreconcilably, and the
/// update is rejected.
pub(crate) fn apply_deposit(
    prev: &ChannelState,
    asset_id: Address,
    total_a: U256,
    total_b: U256,
) -> Result<(ChannelState, Balance), ValidationError> {
    let mut next = prev.clone();
    next.nonce = prev.nonce + 1;
    next.latest_update = None;

    let new_balance = match prev.asset_index(asset_id) {
        Some(idx) => {
            let pending_a = total_a
                .checked_sub(prev.processed_deposits_a[idx])
                .ok_or_else(|| {
                    ValidationError::InvalidDepositTotals(format!(
                        "alice total {total_a} below processed {}",
                        prev.processed_deposits_a[idx]
                    ))
                })?;
            let pending_b = total_b
                .checked_sub(prev.processed_deposits_b[idx])
                .ok_or_else(|| {
                    ValidationError::InvalidDepositTotals(format!(
                        "bob total {total_b} below processed {}",
                        prev.processed_deposits_b[idx]
                    ))
                })?;
            let mut balance = prev.balances[idx].clone();
            balance.amount[0] += pending_a;
            balance.amount[1] += pending_b;
            next.balances[idx] = balance.clone();
            next.processed_deposits_a[idx] = total_a;
            next.processed_deposits_b[idx] = total_b;
            balance
        }
        None => {
            // First touch of this asset: everything on-chain is pending.
            let balance = Balance {
                to: prev.participants(),
                amount: [total_a, total_b],
            };
            next.asset_ids.push(asset_id);
            next.balances.push(balance.clone());
            next.processed_deposits_a.push(total_a);
            next.processed_deposits_b.push(total_b);
            next.defund_nonces.push(1);
            balance
        }
    };

    Ok((next, new_balance))
}

#[derive(Debug)]
pub(crate) struct CreateApplied {
    pub next_state: ChannelState,
    pub next_active: Vec<Transfer>,
    pub channel_balance: Balance,
}

/// Locks a new transfer: deducts its initial balance from the initiator's
/// side and adds it to the merkle commitment.
pub(crate) fn apply_create(
    prev: &ChannelState,
    active: &[Transfer],
    transfer: &Transfer,
) -> Result<CreateApplied, ValidationError> {
    let idx = prev
        .asset_index(transfer.asset_id)
        .ok_or(ValidationError::AssetNotFound(transfer.asset_id))?;
    let initiator_role = prev
        .role_of(transfer.initiator)
        .ok_or_else(|| ValidationError::NotParticipant(transfer.initiator.to_string()))?;

    let locked = transfer.balance.total();
    let side = role_index(initiator_role);
    let available = prev.balances[idx].amount[side];
    let remaining = available
        .checked_sub(locked)
        .ok_or(ValidationError::InsufficientFunds {
            required: locked,
            available,
        })?;

    let mut channel_balance = prev.balances[idx].clone();
    channel_balance.amount[side] = remaining;

    let mut next_active: Vec<Transfer> = active.to_vec();
    next_active.push(transfer.clone());

    let mut next = prev.clone();
    next.nonce = prev.nonce + 1;
    next.latest_update = None;
    next.balances[idx] = channel_balance.clone();
    next.merkle_root = active_transfer_root(&next_active);

    Ok(CreateApplied {
        next_state: next,
        next_active,
        channel_balance,
    })
}

#[derive(Debug)]
pub(crate) struct ResolveApplied {
    pub next_state: ChannelState,
    pub next_active: Vec<Transfer>,
    pub resolved_transfer: Transfer,
    pub channel_balance: Balance,
}

/// Unlocks a transfer: credits the resolved amounts back into the channel
/// balance (matched by address, not by slot order) and removes the transfer
/// from the merkle commitment.
pub(crate) fn apply_resolve(
    prev: &ChannelState,
    active: &[Transfer],
    transfer: &Transfer,
    resolver: Value,
    resolved: &Balance,
) -> Result<ResolveApplied, ValidationError> {
    let idx = prev
        .asset_index(transfer.asset_id)
        .ok_or(ValidationError::AssetNotFound(transfer.asset_id))?;

    let mut channel_balance = prev.balances[idx].clone();
    for slot in 0..2 {
        let recipient = resolved.to[slot];
        let role = prev
            .role_of(recipient)
            .ok_or(ValidationError::RecipientNotParticipant(recipient))?;
        channel_balance.amount[role_index(role)] += resolved.amount[slot];
    }

    let next_active: Vec<Transfer> = active
        .iter()
        .filter(|t| t.transfer_id != transfer.transfer_id)
        .cloned()
        .collect();

    let mut resolved_transfer = transfer.clone();
    resolved_transfer.transfer_resolver = Some(resolver);

    let mut next = prev.clone();
    next.nonce = prev.nonce + 1;
    next.latest_update = None;
    next.balances[idx] = channel_balance.clone();
    next.merkle_root = active_transfer_root(&next_active);

    Ok(ResolveApplied {
        next_state: next,
        next_active,
        resolved_transfer,
        channel_balance,
    })
}
