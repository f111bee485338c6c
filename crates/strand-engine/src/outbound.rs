//! The outbound update flow.
//!
//! A locally proposed update runs: snapshot, lock, validate-and-derive,
//! sign, one message round-trip, countersignature verification, persist.
//! Persistence is the final step, so any failure leaves the channel
//! untouched. On a `StaleUpdate` reply the engine syncs the peer's latest
//! update and retries the proposal exactly once.

use alloy_primitives::Address;

use strand_chain::ChainReader;
use strand_store::EngineStore;
use strand_types::channel::{ChannelRole, ChannelState};
use strand_types::protocol::{ProtocolErrorReason, ProtocolErrorReply, ProtocolUpdate};
use strand_types::signing::verify_commitment_signature;
use strand_types::transfer::Transfer;
use strand_types::update::{UpdateParams, UpdateType};

use crate::engine::ProtocolEngine;
use crate::error::{EngineError, ValidationError};
use crate::external::ExternalValidation;
use crate::messaging::ProtocolMessenger;
use crate::validate::{self, ValidatedUpdate};

/// Outcome of one signature exchange attempt.
enum ExchangeFailure {
    /// The peer answered with a protocol error.
    Rejected(ProtocolErrorReply),
    /// Local or transport failure; not retryable at this level.
    Fatal(Box<EngineError>),
}

impl From<EngineError> for ExchangeFailure {
    fn from(error: EngineError) -> Self {
        ExchangeFailure::Fatal(Box::new(error))
    }
}

impl<S, C, M, V> ProtocolEngine<S, C, M, V>
where
    S: EngineStore,
    C: ChainReader,
    M: ProtocolMessenger,
    V: ExternalValidation,
{
    /// Proposes an update to the counterparty and drives it to a durable,
    /// bilaterally signed state.
    pub(crate) async fn propose(
        &self,
        params: UpdateParams,
    ) -> Result<(ChannelState, Option<Transfer>), EngineError> {
        let update_type = params.update_type();
        let channel_address = self.proposal_channel_address(&params).await?;

        // Snapshot before the lock: a proposal is made against the state its
        // caller saw. If another update lands first, the caller must decide
        // whether its intent still holds.
        let snapshot_nonce = self
            .store()
            .get_channel_state(channel_address)
            .await?
            .map(|c| c.nonce);

        let ttl = self.lock_ttl_for(channel_address).await;
        let _guard = self
            .locks()
            .acquire(channel_address, ttl)
            .await
            .ok_or(EngineError::LockTimeout {
                channel: channel_address,
                ttl,
            })?;
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let (prev, active) = self.load_channel(channel_address).await?;
        if prev.as_ref().map(|c| c.nonce) != snapshot_nonce {
            let observed = prev.as_ref().map(|c| c.nonce).unwrap_or(0);
            return Err(EngineError::StaleUpdate {
                channel: channel_address,
                observed,
            });
        }

        self.external()
            .validate_outbound(&params, prev.as_ref(), &active)
            .await
            .map_err(|reason| {
                EngineError::validation(
                    update_type,
                    channel_address,
                    ValidationError::External(reason),
                )
            })?;

        let validated =
            validate::generate_and_apply(self.signer(), &params, prev.as_ref(), &active, self.reader())
                .await
                .map_err(|source| EngineError::validation(update_type, channel_address, source))?;

        match self.exchange_and_persist(validated, prev.as_ref(), ttl).await {
            Ok(done) => Ok(done),
            Err(ExchangeFailure::Fatal(error)) => Err(*error),
            Err(ExchangeFailure::Rejected(reply))
                if reply.reason == ProtocolErrorReason::StaleUpdate =>
            {
                self.sync_and_retry(params, reply, prev.as_ref(), &active, ttl)
                    .await
            }
            Err(ExchangeFailure::Rejected(reply)) => {
                Err(self.counterparty_rejected(update_type, channel_address, snapshot_nonce, reply))
            }
        }
    }

    /// One sync from the peer's latest update, then one — and only one —
    /// retry of the proposal.
    async fn sync_and_retry(
        &self,
        params: UpdateParams,
        reply: ProtocolErrorReply,
        prev: Option<&ChannelState>,
        active: &[Transfer],
        ttl: std::time::Duration,
    ) -> Result<(ChannelState, Option<Transfer>), EngineError> {
        let update_type = params.update_type();
        let channel_address = reply.channel_address;
        let local_nonce = prev.map(|c| c.nonce).unwrap_or(0);

        let Some(latest) = reply.latest_update.clone() else {
            return Err(self.counterparty_rejected(
                update_type,
                channel_address,
                Some(local_nonce),
                reply,
            ));
        };

        if latest.nonce > local_nonce + 1 {
            return Err(EngineError::RestoreNeeded {
                channel: channel_address,
                local: local_nonce,
                peer: latest.nonce,
            });
        }
        if latest.nonce != local_nonce + 1 {
            return Err(self.counterparty_rejected(
                update_type,
                channel_address,
                Some(local_nonce),
                reply,
            ));
        }

        let (synced, synced_active) = self.sync_from_peer(&latest, prev, active).await?;
        tracing::debug!(channel = %channel_address, nonce = synced.nonce, "retrying proposal after sync");

        let validated = validate::generate_and_apply(
            self.signer(),
            &params,
            Some(&synced),
            &synced_active,
            self.reader(),
        )
        .await
        .map_err(|source| EngineError::validation(update_type, channel_address, source))?;

        match self.exchange_and_persist(validated, Some(&synced), ttl).await {
            Ok(done) => Ok(done),
            Err(ExchangeFailure::Fatal(error)) => Err(*error),
            Err(ExchangeFailure::Rejected(reply)) => Err(self.counterparty_rejected(
                update_type,
                channel_address,
                Some(synced.nonce),
                reply,
            )),
        }
    }

    /// Signs the derived update, runs the message round-trip, verifies the
    /// countersigned result, and persists it.
    async fn exchange_and_persist(
        &self,
        validated: ValidatedUpdate,
        prev: Option<&ChannelState>,
        ttl: std::time::Duration,
    ) -> Result<(ChannelState, Option<Transfer>), ExchangeFailure> {
        let ValidatedUpdate {
            mut update,
            mut next_state,
            next_active: _,
            updated_transfer,
            commitment,
        } = validated;
        let channel = next_state.channel_address;

        let own_signature = self
            .signer()
            .sign_commitment(commitment)
            .await
            .map_err(EngineError::from)?;
        match next_state
            .role_of(self.signer().address())
            .expect("proposer is a participant of the state it derived")
        {
            ChannelRole::Alice => update.alice_signature = Some(own_signature),
            ChannelRole::Bob => update.bob_signature = Some(own_signature),
        }

        let message = ProtocolUpdate {
            update: update.clone(),
            previous_update: prev.and_then(|p| p.latest_update.clone()),
        };
        let to = update.to_identifier.clone();

        let reply = tokio::select! {
            _ = self.cancelled() => return Err(EngineError::Cancelled.into()),
            reply = self.messenger().send_protocol_update(&to, message, ttl) => reply,
        }
        .map_err(|source| EngineError::Messaging { channel, source })?;

        let ack = match reply {
            Ok(ack) => ack,
            Err(error_reply) => return Err(ExchangeFailure::Rejected(error_reply)),
        };

        // The ack must be our update countersigned: same commitment, both
        // signatures valid.
        if ack.update.nonce != update.nonce {
            return Err(EngineError::BadSignatures {
                channel,
                message: format!(
                    "ack nonce {} does not match proposal nonce {}",
                    ack.update.nonce, update.nonce
                ),
            }
            .into());
        }
        for (signature, expected, who) in [
            (&ack.update.alice_signature, next_state.alice, "alice"),
            (&ack.update.bob_signature, next_state.bob, "bob"),
        ] {
            let Some(signature) = signature else {
                return Err(EngineError::BadSignatures {
                    channel,
                    message: format!("ack is missing the {who} signature"),
                }
                .into());
            };
            verify_commitment_signature(commitment, signature, expected).map_err(|e| {
                EngineError::BadSignatures {
                    channel,
                    message: e.to_string(),
                }
            })?;
        }

        next_state.latest_update = Some(ack.update.clone());
        self.store()
            .save_channel_state(&next_state, updated_transfer.as_ref())
            .await
            .map_err(|source| EngineError::SaveChannelFailed { channel, source })?;

        tracing::info!(
            channel = %channel,
            nonce = next_state.nonce,
            update_type = %update.update_type,
            "applied outbound update"
        );
        self.emit_update_event(&next_state, updated_transfer.as_ref(), update.update_type);
        Ok((next_state, updated_transfer))
    }

    /// The channel a proposal addresses; setup derives it from the factory.
    async fn proposal_channel_address(
        &self,
        params: &UpdateParams,
    ) -> Result<Address, EngineError> {
        if let Some(address) = params.channel_address() {
            return Ok(address);
        }
        let UpdateParams::Setup(setup) = params else {
            unreachable!("only setup proposals lack a channel address")
        };
        self.reader()
            .get_channel_address(
                self.signer().address(),
                setup.counterparty_identifier.address(),
                setup.network_context.channel_factory_address,
                setup.network_context.chain_id,
            )
            .await
            .map_err(|source| {
                EngineError::validation(UpdateType::Setup, Address::ZERO, source.into())
            })
    }

    fn counterparty_rejected(
        &self,
        update_type: UpdateType,
        channel: Address,
        local_nonce: Option<u64>,
        reply: ProtocolErrorReply,
    ) -> EngineError {
        EngineError::CounterpartyRejected {
            reason: reply.reason,
            update_type,
            channel,
            nonce: local_nonce.unwrap_or(0),
            message: reply.message,
        }
    }
}
