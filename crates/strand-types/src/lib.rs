//! Core types for the strand state-channel protocol.
//!
//! This crate provides the foundational types shared by every strand component:
//! the off-chain channel record, conditional transfers, signed updates, the
//! commitment hashing that both participants sign, and the wire messages the
//! two peers exchange. It is transport- and storage-agnostic; the engine,
//! chain, and store crates build on top of it.
//!
//! # Overview
//!
//! A *channel* is a two-party off-chain state object backed by an on-chain
//! multisig-style contract. Participants advance the channel by exchanging
//! *updates* (setup, deposit, create, resolve), each of which produces a new
//! [`ChannelState`](channel::ChannelState) whose commitment hash both parties
//! sign. Conditional payments are locked in-channel as
//! [`Transfer`](transfer::Transfer)s whose unlock logic lives in on-chain
//! transfer-definition contracts.
//!
//! # Modules
//!
//! - [`identifiers`] - Public identifiers and their derived account addresses
//! - [`balance`] - Two-slot per-asset balances
//! - [`channel`] - Channel state and network context
//! - [`update`] - Channel updates, per-type details, and proposal parameters
//! - [`transfer`] - Conditional transfers and registry metadata
//! - [`codec`] - ABI-style encoding of opaque transfer payloads
//! - [`merkle`] - Merkle root over active-transfer state hashes
//! - [`commitment`] - Commitment structs, hashing, withdrawal commitments
//! - [`signing`] - Channel signer and signature verification
//! - [`protocol`] - Peer-to-peer wire messages and protocol error reasons
//! - [`transactions`] - On-chain transaction lifecycle records
//! - [`config`] - Engine and RPC configuration

pub mod balance;
pub mod channel;
pub mod codec;
pub mod commitment;
pub mod config;
pub mod identifiers;
pub mod merkle;
pub mod protocol;
pub mod signing;
pub mod transactions;
pub mod transfer;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

pub use balance::Balance;
pub use channel::{ChannelRole, ChannelState, NetworkContext};
pub use commitment::{WithdrawCommitment, hash_channel_commitment, hash_core_transfer_state};
pub use identifiers::PublicIdentifier;
pub use protocol::{ProtocolErrorReason, ProtocolErrorReply, ProtocolUpdate, ProtocolUpdateAck};
pub use signing::ChannelSigner;
pub use transfer::{RegisteredTransfer, Transfer, TransferEncodings, TransferFilter};
pub use update::{ChannelUpdate, UpdateDetails, UpdateParams, UpdateType};
