//! Peer-to-peer protocol messages.
//!
//! The two participants exchange exactly one request/reply pair per update:
//! a [`ProtocolUpdate`] carrying the single-signed proposal (plus the
//! proposer's previous durable update for one-step sync), answered by either
//! a [`ProtocolUpdateAck`] with the countersigned update or a
//! [`ProtocolErrorReply`].

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::update::ChannelUpdate;

/// Request: a proposed update, single-signed by the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolUpdate {
    pub update: ChannelUpdate,
    /// The sender's latest durable update, so a peer behind by one can sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_update: Option<ChannelUpdate>,
}

/// Success reply: the same update countersigned by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolUpdateAck {
    /// Double-signed update.
    pub update: ChannelUpdate,
    /// The receiver's previous durable update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_update: Option<ChannelUpdate>,
}

/// Why a protocol request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolErrorReason {
    /// The proposal's nonce is not ahead of the receiver's state; the reply
    /// carries the receiver's latest update so the sender can sync.
    StaleUpdate,
    /// The peers have diverged by two or more updates; a snapshot restore is
    /// required.
    RestoreNeeded,
    /// Setup updates can never be synced after the fact.
    CannotSyncSetup,
    /// Only bilaterally signed updates may be synced.
    CannotSyncSingleSigned,
    /// A signature did not verify against the commitment hash.
    BadSignatures,
    /// The update violated a validation rule.
    ValidationFailed,
    /// Persisting the validated update failed.
    StoreFailure,
    /// The request could not be processed within the protocol timeout.
    MessageTimeout,
}

impl fmt::Display for ProtocolErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolErrorReason::StaleUpdate => "staleUpdate",
            ProtocolErrorReason::RestoreNeeded => "restoreNeeded",
            ProtocolErrorReason::CannotSyncSetup => "cannotSyncSetup",
            ProtocolErrorReason::CannotSyncSingleSigned => "cannotSyncSingleSigned",
            ProtocolErrorReason::BadSignatures => "badSignatures",
            ProtocolErrorReason::ValidationFailed => "validationFailed",
            ProtocolErrorReason::StoreFailure => "storeFailure",
            ProtocolErrorReason::MessageTimeout => "messageTimeout",
        };
        f.write_str(s)
    }
}

/// Error reply to a [`ProtocolUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolErrorReply {
    pub reason: ProtocolErrorReason,
    /// Human-readable context for logs.
    pub message: String,
    pub channel_address: Address,
    /// For [`ProtocolErrorReason::StaleUpdate`]: the receiver's latest
    /// durable update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_update: Option<ChannelUpdate>,
}

impl ProtocolErrorReply {
    pub fn new(
        reason: ProtocolErrorReason,
        channel_address: Address,
        message: impl Into<String>,
    ) -> Self {
        ProtocolErrorReply {
            reason,
            message: message.into(),
            channel_address,
            latest_update: None,
        }
    }

    pub fn with_latest_update(mut self, latest: Option<ChannelUpdate>) -> Self {
        self.latest_update = latest;
        self
    }
}

/// Outcome of one protocol round-trip.
pub type ProtocolReply = Result<ProtocolUpdateAck, ProtocolErrorReply>;
