//! Two-party state channels in Rust.
//!
//! `strand-rs` is the facade over the strand workspace: it re-exports the
//! data model, the chain boundaries, the store contract, and the update
//! protocol engine as one dependency.
//!
//! # Overview
//!
//! Two participants — Alice, the initiator role, and Bob, the responder —
//! maintain an off-chain, cryptographically signed shared state over an
//! on-chain multisig-style contract. The state records per-asset balances
//! plus a set of conditional transfers whose unlock logic is deployed
//! on-chain. Every state transition is an *update* (setup, deposit, create,
//! resolve) that both parties sign; the engine validates, applies, exchanges
//! signatures, synchronizes divergent replicas, and persists.
//!
//! # Crates
//!
//! - [`types`] - identifiers, balances, channel and transfer state, updates,
//!   commitments, signing, wire messages, configuration
//! - [`chain`] - the chain reader (alloy JSON-RPC) and chain sender
//!   boundaries
//! - [`store`] - the persistence contract plus an in-memory reference store
//! - [`engine`] - the update protocol engine
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strand_rs::engine::ProtocolEngine;
//! use strand_rs::store::InMemoryStore;
//! use strand_rs::types::config::EngineConfig;
//! use strand_rs::types::signing::ChannelSigner;
//!
//! let signer = ChannelSigner::from_bytes(&private_key)?;
//! let engine = ProtocolEngine::new(
//!     signer,
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(chain_reader),
//!     Arc::new(messenger),
//!     EngineConfig::default(),
//! );
//! let channel = engine.setup(setup_params).await?;
//! ```

pub use strand_chain as chain;
pub use strand_engine as engine;
pub use strand_store as store;
pub use strand_types as types;

pub use strand_chain::{ChainError, ChainReader, ChainSender, Eip155ChainReader};
pub use strand_engine::{EngineError, EngineEvent, ProtocolEngine, TransactionQueue};
pub use strand_store::{EngineStore, InMemoryStore, StoreError};
pub use strand_types::{
    Balance, ChannelSigner, ChannelState, ChannelUpdate, NetworkContext, PublicIdentifier,
    Transfer, UpdateType,
};
