//! Pluggable application-level validation.
//!
//! Deployments can layer extra predicates over every update (rate limits,
//! allowlists, transfer-type policy) without touching the protocol core.
//! The default accepts everything.

use async_trait::async_trait;

use strand_types::channel::ChannelState;
use strand_types::transfer::Transfer;
use strand_types::update::{ChannelUpdate, UpdateParams};

/// Additional predicates applied to every outbound proposal and inbound
/// update. Rejections surface as validation errors and are never retried.
#[async_trait]
pub trait ExternalValidation: Send + Sync {
    async fn validate_outbound(
        &self,
        params: &UpdateParams,
        previous: Option<&ChannelState>,
        active: &[Transfer],
    ) -> Result<(), String>;

    async fn validate_inbound(
        &self,
        update: &ChannelUpdate,
        previous: Option<&ChannelState>,
        active: &[Transfer],
    ) -> Result<(), String>;
}

/// The default external validator: accepts every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl ExternalValidation for AcceptAll {
    async fn validate_outbound(
        &self,
        _params: &UpdateParams,
        _previous: Option<&ChannelState>,
        _active: &[Transfer],
    ) -> Result<(), String> {
        Ok(())
    }

    async fn validate_inbound(
        &self,
        _update: &ChannelUpdate,
        _previous: Option<&ChannelState>,
        _active: &[Transfer],
    ) -> Result<(), String> {
        Ok(())
    }
}
