//! Update validation.
//!
//! Two entry points, one shared derivation core:
//!
//! - [`generate_and_apply`] turns locally proposed [`UpdateParams`] into a
//!   validated [`ChannelUpdate`] plus the next state;
//! - [`validate_and_apply_inbound`] re-derives the next state from a received
//!   update and cross-checks every claimed field (balance, merkle root,
//!   nonce, signatures) against the local recomputation.
//!
//! Everything that touches the chain happens here; the appliers in
//! [`crate::apply`] stay pure.

use alloy_primitives::{Address, B256};
use serde_json::Value;

use strand_chain::ChainReader;
use strand_types::balance::Balance;
use strand_types::channel::{ChannelRole, ChannelState};
use strand_types::codec;
use strand_types::commitment::hash_channel_commitment;
use strand_types::signing::{ChannelSigner, verify_commitment_signature};
use strand_types::transfer::Transfer;
use strand_types::update::{
    ChannelUpdate, CreateParams, CreateUpdateDetails, DepositParams, DepositUpdateDetails,
    ResolveParams, ResolveUpdateDetails, SetupParams, SetupUpdateDetails, UpdateDetails,
    UpdateParams, UpdateType,
};

use crate::apply;
use crate::error::ValidationError;

/// A validated update and everything the engine needs to finish it.
pub(crate) struct ValidatedUpdate {
    /// The derived (outbound) or received (inbound) update. Outbound updates
    /// carry no signatures yet.
    pub update: ChannelUpdate,
    /// The next channel state, `latest_update` not yet attached.
    pub next_state: ChannelState,
    pub next_active: Vec<Transfer>,
    /// The created or resolved transfer, if the update touches one.
    pub updated_transfer: Option<Transfer>,
    /// `H(next_state)`, the hash both parties sign.
    pub commitment: B256,
}

/// Validates locally proposed parameters against the previous state and
/// derives the update the proposer will sign.
pub(crate) async fn generate_and_apply<C: ChainReader + ?Sized>(
    signer: &ChannelSigner,
    params: &UpdateParams,
    prev: Option<&ChannelState>,
    active: &[Transfer],
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    match params {
        UpdateParams::Setup(p) => generate_setup(signer, p, prev, reader).await,
        UpdateParams::Deposit(p) => generate_deposit(signer, p, prev, reader).await,
        UpdateParams::Create(p) => generate_create(signer, p, prev, active, reader).await,
        UpdateParams::Resolve(p) => generate_resolve(signer, p, prev, active, reader).await,
    }
}

async fn generate_setup<C: ChainReader + ?Sized>(
    signer: &ChannelSigner,
    params: &SetupParams,
    prev: Option<&ChannelState>,
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    if let Some(prev) = prev {
        return Err(ValidationError::ChannelAlreadySetup(prev.channel_address));
    }
    if params.timeout == 0 {
        return Err(ValidationError::InvalidTimeout(params.timeout));
    }
    let alice = signer.public_identifier().clone();
    let bob = params.counterparty_identifier.clone();
    if alice == bob {
        return Err(ValidationError::MalformedUpdate(
            "cannot open a channel with oneself".to_string(),
        ));
    }

    let derived = reader
        .get_channel_address(
            alice.address(),
            bob.address(),
            params.network_context.channel_factory_address,
            params.network_context.chain_id,
        )
        .await?;

    let details = SetupUpdateDetails {
        network_context: params.network_context.clone(),
        timeout: params.timeout,
        meta: params.meta.clone(),
    };
    let next_state = apply::apply_setup(derived, &alice, &bob, &details);
    let commitment = hash_channel_commitment(&next_state);

    let update = ChannelUpdate {
        channel_address: derived,
        from_identifier: alice.clone(),
        to_identifier: bob,
        update_type: UpdateType::Setup,
        nonce: 1,
        balance: Balance::empty([next_state.alice, next_state.bob]),
        asset_id: Address::ZERO,
        details: UpdateDetails::Setup(details),
        alice_signature: None,
        bob_signature: None,
    };

    Ok(ValidatedUpdate {
        update,
        next_state,
        next_active: vec![],
        updated_transfer: None,
        commitment,
    })
}

async fn generate_deposit<C: ChainReader + ?Sized>(
    signer: &ChannelSigner,
    params: &DepositParams,
    prev: Option<&ChannelState>,
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    let prev = existing_channel(prev, params.channel_address)?;
    let counterparty = participant_counterparty(prev, signer)?;
    let chain_id = prev.network_context.chain_id;

    let total_a = reader
        .get_total_deposits_alice(prev.channel_address, chain_id, params.asset_id)
        .await?;
    let total_b = reader
        .get_total_deposits_bob(prev.channel_address, chain_id, params.asset_id)
        .await?;

    let (next_state, balance) = apply::apply_deposit(prev, params.asset_id, total_a, total_b)?;
    let commitment = hash_channel_commitment(&next_state);

    let update = ChannelUpdate {
        channel_address: prev.channel_address,
        from_identifier: signer.public_identifier().clone(),
        to_identifier: counterparty,
        update_type: UpdateType::Deposit,
        nonce: next_state.nonce,
        balance,
        asset_id: params.asset_id,
        details: UpdateDetails::Deposit(DepositUpdateDetails {
            total_deposits_alice: total_a,
            total_deposits_bob: total_b,
            meta: params.meta.clone(),
        }),
        alice_signature: None,
        bob_signature: None,
    };

    Ok(ValidatedUpdate {
        update,
        next_state,
        next_active: vec![],
        updated_transfer: None,
        commitment,
    })
}

async fn generate_create<C: ChainReader + ?Sized>(
    signer: &ChannelSigner,
    params: &CreateParams,
    prev: Option<&ChannelState>,
    active: &[Transfer],
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    let prev = existing_channel(prev, params.channel_address)?;
    let counterparty = participant_counterparty(prev, signer)?;
    let chain_id = prev.network_context.chain_id;
    let registry = prev.network_context.transfer_registry_address;

    let registered = reader
        .get_registered_transfer_by_definition(params.transfer_definition, registry, chain_id)
        .await?;
    codec::check_payload(&registered.state_encoding, &params.transfer_initial_state)?;
    check_transfer_timeout(params.timeout, prev.timeout)?;
    check_transfer_recipients(prev, &params.balance)?;

    let initial_state_hash =
        codec::hash_transfer_state(&params.transfer_initial_state, &registered.state_encoding)?;
    let transfer = Transfer {
        transfer_id: B256::random(),
        channel_address: prev.channel_address,
        chain_id,
        channel_factory_address: prev.network_context.channel_factory_address,
        initiator: signer.address(),
        responder: counterparty.address(),
        channel_nonce: prev.nonce + 1,
        transfer_definition: params.transfer_definition,
        transfer_encodings: registered.encodings(),
        balance: params.balance.clone(),
        asset_id: params.asset_id,
        transfer_timeout: params.timeout,
        initial_state_hash,
        transfer_state: params.transfer_initial_state.clone(),
        transfer_resolver: None,
        meta: params.meta.clone(),
        in_dispute: false,
    };

    let applied = apply::apply_create(prev, active, &transfer)?;

    if !reader
        .create(
            &params.transfer_initial_state,
            &params.balance,
            params.transfer_definition,
            registry,
            chain_id,
        )
        .await?
    {
        return Err(ValidationError::CreateRejected);
    }

    let commitment = hash_channel_commitment(&applied.next_state);
    let update = ChannelUpdate {
        channel_address: prev.channel_address,
        from_identifier: signer.public_identifier().clone(),
        to_identifier: counterparty,
        update_type: UpdateType::Create,
        nonce: applied.next_state.nonce,
        balance: applied.channel_balance.clone(),
        asset_id: params.asset_id,
        details: UpdateDetails::Create(CreateUpdateDetails {
            transfer_id: transfer.transfer_id,
            balance: transfer.balance.clone(),
            transfer_definition: transfer.transfer_definition,
            transfer_timeout: transfer.transfer_timeout,
            transfer_initial_state: transfer.transfer_state.clone(),
            transfer_encodings: transfer.transfer_encodings.clone(),
            merkle_root: applied.next_state.merkle_root,
            meta: params.meta.clone(),
        }),
        alice_signature: None,
        bob_signature: None,
    };

    Ok(ValidatedUpdate {
        update,
        next_state: applied.next_state,
        next_active: applied.next_active,
        updated_transfer: Some(transfer),
        commitment,
    })
}

async fn generate_resolve<C: ChainReader + ?Sized>(
    signer: &ChannelSigner,
    params: &ResolveParams,
    prev: Option<&ChannelState>,
    active: &[Transfer],
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    let prev = existing_channel(prev, params.channel_address)?;
    let counterparty = participant_counterparty(prev, signer)?;

    let transfer = active
        .iter()
        .find(|t| t.transfer_id == params.transfer_id)
        .ok_or(ValidationError::TransferNotActive(params.transfer_id))?;
    if signer.address() != transfer.responder {
        return Err(ValidationError::OnlyResponderMayResolve);
    }

    let resolved_balance =
        resolve_transfer_balance(transfer, &params.transfer_resolver, prev, reader).await?;
    let applied = apply::apply_resolve(
        prev,
        active,
        transfer,
        params.transfer_resolver.clone(),
        &resolved_balance,
    )?;

    let commitment = hash_channel_commitment(&applied.next_state);
    let update = ChannelUpdate {
        channel_address: prev.channel_address,
        from_identifier: signer.public_identifier().clone(),
        to_identifier: counterparty,
        update_type: UpdateType::Resolve,
        nonce: applied.next_state.nonce,
        balance: applied.channel_balance.clone(),
        asset_id: transfer.asset_id,
        details: UpdateDetails::Resolve(ResolveUpdateDetails {
            transfer_id: transfer.transfer_id,
            transfer_definition: transfer.transfer_definition,
            transfer_resolver: params.transfer_resolver.clone(),
            merkle_root: applied.next_state.merkle_root,
            meta: params.meta.clone(),
        }),
        alice_signature: None,
        bob_signature: None,
    };

    Ok(ValidatedUpdate {
        update,
        next_state: applied.next_state,
        next_active: applied.next_active,
        updated_transfer: Some(applied.resolved_transfer),
        commitment,
    })
}

/// Validates an update received from the peer and re-derives the next state.
///
/// Every derived field the proposer claimed is recomputed locally and
/// compared; signature verification runs over the recomputed commitment, so
/// a signature that verifies also certifies agreement on the whole state.
pub(crate) async fn validate_and_apply_inbound<C: ChainReader + ?Sized>(
    update: &ChannelUpdate,
    prev: Option<&ChannelState>,
    active: &[Transfer],
    reader: &C,
    require_double_signed: bool,
) -> Result<ValidatedUpdate, ValidationError> {
    if !update.details_match_type() {
        return Err(ValidationError::MalformedUpdate(format!(
            "details do not match update type {}",
            update.update_type
        )));
    }

    let validated = match (&update.details, prev) {
        (UpdateDetails::Setup(details), prev) => {
            inbound_setup(update, details, prev, reader).await?
        }
        (_, None) => return Err(ValidationError::ChannelNotFound(update.channel_address)),
        (UpdateDetails::Deposit(details), Some(prev)) => {
            inbound_deposit(update, details, prev, reader).await?
        }
        (UpdateDetails::Create(details), Some(prev)) => {
            inbound_create(update, details, prev, active, reader).await?
        }
        (UpdateDetails::Resolve(details), Some(prev)) => {
            inbound_resolve(update, details, prev, active, reader).await?
        }
    };

    verify_update_signatures(
        &validated.next_state,
        update,
        validated.commitment,
        require_double_signed,
    )?;
    Ok(validated)
}

async fn inbound_setup<C: ChainReader + ?Sized>(
    update: &ChannelUpdate,
    details: &SetupUpdateDetails,
    prev: Option<&ChannelState>,
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    if let Some(prev) = prev {
        return Err(ValidationError::ChannelAlreadySetup(prev.channel_address));
    }
    if update.nonce != 1 {
        return Err(ValidationError::InvalidUpdateNonce {
            expected: 1,
            actual: update.nonce,
        });
    }
    if details.timeout == 0 {
        return Err(ValidationError::InvalidTimeout(details.timeout));
    }
    let alice = update.from_identifier.clone();
    let bob = update.to_identifier.clone();
    let derived = reader
        .get_channel_address(
            alice.address(),
            bob.address(),
            details.network_context.channel_factory_address,
            details.network_context.chain_id,
        )
        .await?;
    if derived != update.channel_address {
        return Err(ValidationError::ChannelAddressMismatch {
            derived,
            given: update.channel_address,
        });
    }
    let next_state = apply::apply_setup(derived, &alice, &bob, details);
    let commitment = hash_channel_commitment(&next_state);
    Ok(ValidatedUpdate {
        update: update.clone(),
        next_state,
        next_active: vec![],
        updated_transfer: None,
        commitment,
    })
}

async fn inbound_deposit<C: ChainReader + ?Sized>(
    update: &ChannelUpdate,
    details: &DepositUpdateDetails,
    prev: &ChannelState,
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    inbound_preconditions(update, prev)?;
    let chain_id = prev.network_context.chain_id;

    // The proposer's claimed cumulative totals drive the balance math, but
    // they must not exceed what the chain actually shows us.
    let chain_a = reader
        .get_total_deposits_alice(prev.channel_address, chain_id, update.asset_id)
        .await?;
    let chain_b = reader
        .get_total_deposits_bob(prev.channel_address, chain_id, update.asset_id)
        .await?;
    if details.total_deposits_alice > chain_a || details.total_deposits_bob > chain_b {
        return Err(ValidationError::InvalidDepositTotals(format!(
            "claimed totals ({}, {}) exceed on-chain totals ({chain_a}, {chain_b})",
            details.total_deposits_alice, details.total_deposits_bob
        )));
    }

    let (next_state, balance) = apply::apply_deposit(
        prev,
        update.asset_id,
        details.total_deposits_alice,
        details.total_deposits_bob,
    )?;
    if balance != update.balance {
        return Err(ValidationError::BalanceMismatch);
    }
    let commitment = hash_channel_commitment(&next_state);
    Ok(ValidatedUpdate {
        update: update.clone(),
        next_state,
        next_active: vec![],
        updated_transfer: None,
        commitment,
    })
}

async fn inbound_create<C: ChainReader + ?Sized>(
    update: &ChannelUpdate,
    details: &CreateUpdateDetails,
    prev: &ChannelState,
    active: &[Transfer],
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    inbound_preconditions(update, prev)?;
    let chain_id = prev.network_context.chain_id;
    let registry = prev.network_context.transfer_registry_address;

    let registered = reader
        .get_registered_transfer_by_definition(details.transfer_definition, registry, chain_id)
        .await?;
    if registered.encodings() != details.transfer_encodings {
        return Err(ValidationError::EncodingMismatch);
    }
    codec::check_payload(&registered.state_encoding, &details.transfer_initial_state)?;
    check_transfer_timeout(details.transfer_timeout, prev.timeout)?;
    check_transfer_recipients(prev, &details.balance)?;

    let initiator = update.from_identifier.address();
    let responder = prev
        .counterparty_of(&update.from_identifier)
        .ok_or_else(|| ValidationError::NotParticipant(update.from_identifier.to_string()))?
        .address();
    let initial_state_hash =
        codec::hash_transfer_state(&details.transfer_initial_state, &registered.state_encoding)?;

    let transfer = Transfer {
        transfer_id: details.transfer_id,
        channel_address: prev.channel_address,
        chain_id,
        channel_factory_address: prev.network_context.channel_factory_address,
        initiator,
        responder,
        channel_nonce: update.nonce,
        transfer_definition: details.transfer_definition,
        transfer_encodings: details.transfer_encodings.clone(),
        balance: details.balance.clone(),
        asset_id: update.asset_id,
        transfer_timeout: details.transfer_timeout,
        initial_state_hash,
        transfer_state: details.transfer_initial_state.clone(),
        transfer_resolver: None,
        meta: details.meta.clone(),
        in_dispute: false,
    };

    let applied = apply::apply_create(prev, active, &transfer)?;
    if !reader
        .create(
            &details.transfer_initial_state,
            &details.balance,
            details.transfer_definition,
            registry,
            chain_id,
        )
        .await?
    {
        return Err(ValidationError::CreateRejected);
    }
    if applied.next_state.merkle_root != details.merkle_root {
        return Err(ValidationError::MerkleRootMismatch);
    }
    if applied.channel_balance != update.balance {
        return Err(ValidationError::BalanceMismatch);
    }

    let commitment = hash_channel_commitment(&applied.next_state);
    Ok(ValidatedUpdate {
        update: update.clone(),
        next_state: applied.next_state,
        next_active: applied.next_active,
        updated_transfer: Some(transfer),
        commitment,
    })
}

async fn inbound_resolve<C: ChainReader + ?Sized>(
    update: &ChannelUpdate,
    details: &ResolveUpdateDetails,
    prev: &ChannelState,
    active: &[Transfer],
    reader: &C,
) -> Result<ValidatedUpdate, ValidationError> {
    inbound_preconditions(update, prev)?;

    let transfer = active
        .iter()
        .find(|t| t.transfer_id == details.transfer_id)
        .ok_or(ValidationError::TransferNotActive(details.transfer_id))?;
    if transfer.transfer_definition != details.transfer_definition {
        return Err(ValidationError::MalformedUpdate(
            "resolve names a different transfer definition".to_string(),
        ));
    }
    if update.from_identifier.address() != transfer.responder {
        return Err(ValidationError::OnlyResponderMayResolve);
    }

    let resolved_balance =
        resolve_transfer_balance(transfer, &details.transfer_resolver, prev, reader).await?;
    let applied = apply::apply_resolve(
        prev,
        active,
        transfer,
        details.transfer_resolver.clone(),
        &resolved_balance,
    )?;
    if applied.next_state.merkle_root != details.merkle_root {
        return Err(ValidationError::MerkleRootMismatch);
    }
    if applied.channel_balance != update.balance {
        return Err(ValidationError::BalanceMismatch);
    }

    let commitment = hash_channel_commitment(&applied.next_state);
    Ok(ValidatedUpdate {
        update: update.clone(),
        next_state: applied.next_state,
        next_active: applied.next_active,
        updated_transfer: Some(applied.resolved_transfer),
        commitment,
    })
}

/// Common inbound checks for non-setup updates.
fn inbound_preconditions(
    update: &ChannelUpdate,
    prev: &ChannelState,
) -> Result<(), ValidationError> {
    if prev.channel_address != update.channel_address {
        return Err(ValidationError::ChannelAddressMismatch {
            derived: prev.channel_address,
            given: update.channel_address,
        });
    }
    if prev.in_dispute {
        return Err(ValidationError::InDispute(prev.channel_address));
    }
    if update.nonce != prev.nonce + 1 {
        return Err(ValidationError::InvalidUpdateNonce {
            expected: prev.nonce + 1,
            actual: update.nonce,
        });
    }
    if prev.role_of_identifier(&update.from_identifier).is_none() {
        return Err(ValidationError::NotParticipant(
            update.from_identifier.to_string(),
        ));
    }
    if prev.role_of_identifier(&update.to_identifier).is_none()
        || update.from_identifier == update.to_identifier
    {
        return Err(ValidationError::MalformedUpdate(
            "update recipient is not the counterparty".to_string(),
        ));
    }
    Ok(())
}

/// Evaluates what the channel balance gains when a transfer resolves.
///
/// A `Null` resolver is the cooperative cancellation: the locked balance
/// reverts to the transfer initiator without consulting the chain.
async fn resolve_transfer_balance<C: ChainReader + ?Sized>(
    transfer: &Transfer,
    resolver: &Value,
    prev: &ChannelState,
    reader: &C,
) -> Result<Balance, ValidationError> {
    if resolver.is_null() {
        return Ok(transfer.balance.clone());
    }
    codec::check_payload(&transfer.transfer_encodings.resolver, resolver)?;
    let mut with_resolver = transfer.clone();
    with_resolver.transfer_resolver = Some(resolver.clone());
    let resolved = reader
        .resolve(&with_resolver, prev.network_context.chain_id)
        .await?;
    let locked = transfer.balance.total();
    let total = resolved.total();
    if total != locked {
        return Err(ValidationError::InvalidResolve {
            locked,
            resolved: total,
        });
    }
    Ok(resolved)
}

fn check_transfer_timeout(transfer_timeout: u64, channel_timeout: u64) -> Result<(), ValidationError> {
    if transfer_timeout == 0 {
        return Err(ValidationError::InvalidTimeout(transfer_timeout));
    }
    if transfer_timeout > channel_timeout {
        return Err(ValidationError::TransferTimeoutAboveChannel {
            transfer: transfer_timeout,
            channel: channel_timeout,
        });
    }
    Ok(())
}

fn check_transfer_recipients(
    prev: &ChannelState,
    balance: &Balance,
) -> Result<(), ValidationError> {
    for recipient in balance.to {
        if !prev.is_participant(recipient) {
            return Err(ValidationError::RecipientNotParticipant(recipient));
        }
    }
    Ok(())
}

/// Verifies the proposer's signature (and, when required, both) against the
/// recomputed commitment.
fn verify_update_signatures(
    next_state: &ChannelState,
    update: &ChannelUpdate,
    commitment: B256,
    require_double_signed: bool,
) -> Result<(), ValidationError> {
    let sender_role = next_state
        .role_of_identifier(&update.from_identifier)
        .ok_or_else(|| ValidationError::NotParticipant(update.from_identifier.to_string()))?;

    let verify_role = |role: ChannelRole| -> Result<(), ValidationError> {
        let (signature, expected) = match role {
            ChannelRole::Alice => (&update.alice_signature, next_state.alice),
            ChannelRole::Bob => (&update.bob_signature, next_state.bob),
        };
        let signature = signature.as_ref().ok_or(ValidationError::MissingSignature)?;
        verify_commitment_signature(commitment, signature, expected)?;
        Ok(())
    };

    verify_role(sender_role)?;
    if require_double_signed {
        verify_role(match sender_role {
            ChannelRole::Alice => ChannelRole::Bob,
            ChannelRole::Bob => ChannelRole::Alice,
        })?;
    }
    Ok(())
}

fn existing_channel<'a>(
    prev: Option<&'a ChannelState>,
    channel_address: Address,
) -> Result<&'a ChannelState, ValidationError> {
    let prev = prev.ok_or(ValidationError::ChannelNotFound(channel_address))?;
    if prev.channel_address != channel_address {
        return Err(ValidationError::ChannelAddressMismatch {
            derived: prev.channel_address,
            given: channel_address,
        });
    }
    if prev.in_dispute {
        return Err(ValidationError::InDispute(prev.channel_address));
    }
    Ok(prev)
}

fn participant_counterparty(
    prev: &ChannelState,
    signer: &ChannelSigner,
) -> Result<strand_types::PublicIdentifier, ValidationError> {
    prev.counterparty_of(signer.public_identifier())
        .cloned()
        .ok_or_else(|| ValidationError::NotParticipant(signer.public_identifier().to_string()))
}
