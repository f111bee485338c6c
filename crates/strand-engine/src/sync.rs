//! One-step sync with the counterparty.
//!
//! When a participant is behind by exactly one update it catches up by
//! applying the peer's latest *double-signed* update through the normal
//! inbound validation pipeline. Both the outbound engine (after a
//! `StaleUpdate` reply) and the inbound engine (on a nonce gap of two) use
//! this path. It never retries; callers decide what happens after the sync.

use strand_chain::ChainReader;
use strand_store::EngineStore;
use strand_types::channel::ChannelState;
use strand_types::protocol::ProtocolErrorReason;
use strand_types::transfer::Transfer;
use strand_types::update::{ChannelUpdate, UpdateType};

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
    /// Applies the peer's latest update on top of our state and persists the
    /// result. Caller must hold the channel lock.
    pub(crate) async fn sync_from_peer(
        &self,
        latest: &ChannelUpdate,
        prev: Option<&ChannelState>,
        active: &[Transfer],
    ) -> Result<(ChannelState, Vec<Transfer>), EngineError> {
        let channel = latest.channel_address;
        if latest.update_type == UpdateType::Setup {
            return Err(EngineError::CannotSync {
                channel,
                reason: ProtocolErrorReason::CannotSyncSetup,
            });
        }
        if !latest.is_double_signed() {
            return Err(EngineError::CannotSync {
                channel,
                reason: ProtocolErrorReason::CannotSyncSingleSigned,
            });
        }

        let validated =
            validate::validate_and_apply_inbound(latest, prev, active, self.reader(), true)
                .await
                .map_err(|source| EngineError::validation(latest.update_type, channel, source))?;

        let mut next = validated.next_state;
        next.latest_update = Some(latest.clone());
        self.store()
            .save_channel_state(&next, validated.updated_transfer.as_ref())
            .await
            .map_err(|source| EngineError::SaveChannelFailed { channel, source })?;

        tracing::info!(channel = %channel, nonce = next.nonce, "synced channel from peer");
        Ok((next, validated.next_active))
    }
}
