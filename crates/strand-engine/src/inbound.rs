//! The inbound update flow.
//!
//! A received `ProtocolUpdate` is dispatched on the nonce gap between the
//! proposal and our local state: behind or equal replies `StaleUpdate` with
//! our latest durable update, one ahead validates and applies, two ahead
//! syncs the attached previous update first, three or more ahead requires a
//! restore. Every failure is both replied to the peer and logged locally.

use strand_chain::ChainReader;
use strand_store::EngineStore;
use strand_types::channel::ChannelRole;
use strand_types::identifiers::PublicIdentifier;
use strand_types::protocol::{
    ProtocolErrorReason, ProtocolErrorReply, ProtocolReply, ProtocolUpdate, ProtocolUpdateAck,
};

use crate::engine::ProtocolEngine;
use crate::error::EngineError;
use crate::external::ExternalValidation;
use crate::messaging::ProtocolMessenger;
use crate::validate;

impl<S, C, M, V> ProtocolEngine<S, C, M, V>
where
    S: EngineStore,
    C: ChainReader,
    M: ProtocolMessenger,
    V: ExternalValidation,
{
    /// Handles one protocol request from the peer. The returned reply is
    /// what the transport should send back.
    pub async fn handle_protocol_update(
        &self,
        from: &PublicIdentifier,
        message: ProtocolUpdate,
    ) -> ProtocolReply {
        let result = self.handle_protocol_update_inner(from, &message).await;
        if let Err(reply) = &result {
            tracing::warn!(
                channel = %reply.channel_address,
                reason = %reply.reason,
                detail = %reply.message,
                "rejected inbound update"
            );
        }
        result
    }

    async fn handle_protocol_update_inner(
        &self,
        from: &PublicIdentifier,
        message: &ProtocolUpdate,
    ) -> ProtocolReply {
        let update = &message.update;
        let channel_address = update.channel_address;
        let reject = |reason: ProtocolErrorReason, detail: String| {
            ProtocolErrorReply::new(reason, channel_address, detail)
        };

        if &update.from_identifier != from {
            return Err(reject(
                ProtocolErrorReason::ValidationFailed,
                "update does not come from its fromIdentifier".to_string(),
            ));
        }
        if &update.to_identifier != self.signer().public_identifier() {
            return Err(reject(
                ProtocolErrorReason::ValidationFailed,
                "update is not addressed to this signer".to_string(),
            ));
        }

        let ttl = self.lock_ttl_for(channel_address).await;
        let Some(_guard) = self.locks().acquire(channel_address, ttl).await else {
            return Err(reject(
                ProtocolErrorReason::MessageTimeout,
                format!("could not acquire channel lock within {ttl:?}"),
            ));
        };

        let (mut prev, mut active) = match self.load_channel(channel_address).await {
            Ok(loaded) => loaded,
            Err(error) => {
                return Err(reject(ProtocolErrorReason::StoreFailure, error.to_string()));
            }
        };

        let local_nonce = prev.as_ref().map(|c| c.nonce).unwrap_or(0);
        let gap = i128::from(update.nonce) - i128::from(local_nonce);
        match gap {
            ..=0 => {
                return Err(reject(
                    ProtocolErrorReason::StaleUpdate,
                    format!("proposal nonce {} is not ahead of {local_nonce}", update.nonce),
                )
                .with_latest_update(prev.and_then(|p| p.latest_update)));
            }
            1 => {}
            2 => {
                // We are behind by one; the attached previous update bridges
                // the gap. Setup updates cannot be synced this way.
                let Some(peer_previous) = &message.previous_update else {
                    return Err(reject(
                        ProtocolErrorReason::RestoreNeeded,
                        "behind by one but no previous update attached".to_string(),
                    ));
                };
                if peer_previous.nonce != local_nonce + 1 {
                    return Err(reject(
                        ProtocolErrorReason::RestoreNeeded,
                        format!(
                            "previous update nonce {} does not bridge local nonce {local_nonce}",
                            peer_previous.nonce
                        ),
                    ));
                }
                match self.sync_from_peer(peer_previous, prev.as_ref(), &active).await {
                    Ok((synced, synced_active)) => {
                        prev = Some(synced);
                        active = synced_active;
                    }
                    Err(error) => return Err(self.sync_failure_reply(channel_address, error)),
                }
            }
            _ => {
                return Err(reject(
                    ProtocolErrorReason::RestoreNeeded,
                    format!("proposal nonce {} is {gap} ahead of {local_nonce}", update.nonce),
                ));
            }
        }

        if let Err(reason) = self
            .external()
            .validate_inbound(update, prev.as_ref(), &active)
            .await
        {
            return Err(reject(ProtocolErrorReason::ValidationFailed, reason));
        }

        let validated = match validate::validate_and_apply_inbound(
            update,
            prev.as_ref(),
            &active,
            self.reader(),
            false,
        )
        .await
        {
            Ok(validated) => validated,
            Err(error) => return Err(reject(error.protocol_reason(), error.to_string())),
        };

        // Countersign and make the update durable.
        let own_signature = match self.signer().sign_commitment(validated.commitment).await {
            Ok(signature) => signature,
            Err(error) => {
                return Err(reject(ProtocolErrorReason::ValidationFailed, error.to_string()));
            }
        };
        let mut signed = validated.update.clone();
        match validated
            .next_state
            .role_of(self.signer().address())
            .expect("recipient is a participant of the state it derived")
        {
            ChannelRole::Alice => signed.alice_signature = Some(own_signature),
            ChannelRole::Bob => signed.bob_signature = Some(own_signature),
        }

        let previous_update = prev.as_ref().and_then(|p| p.latest_update.clone());
        let mut next_state = validated.next_state;
        next_state.latest_update = Some(signed.clone());
        if let Err(error) = self
            .store()
            .save_channel_state(&next_state, validated.updated_transfer.as_ref())
            .await
        {
            return Err(reject(ProtocolErrorReason::StoreFailure, error.to_string()));
        }

        tracing::info!(
            channel = %channel_address,
            nonce = next_state.nonce,
            update_type = %update.update_type,
            "applied inbound update"
        );
        self.emit_update_event(
            &next_state,
            validated.updated_transfer.as_ref(),
            update.update_type,
        );

        Ok(ProtocolUpdateAck {
            update: signed,
            previous_update,
        })
    }

    fn sync_failure_reply(
        &self,
        channel_address: alloy_primitives::Address,
        error: EngineError,
    ) -> ProtocolErrorReply {
        let reason = match &error {
            EngineError::CannotSync { reason, .. } => *reason,
            EngineError::Validation { source, .. } => source.protocol_reason(),
            EngineError::SaveChannelFailed { .. } | EngineError::Store(_) => {
                ProtocolErrorReason::StoreFailure
            }
            _ => ProtocolErrorReason::ValidationFailed,
        };
        ProtocolErrorReply::new(reason, channel_address, format!("sync failed: {error}"))
    }
}
