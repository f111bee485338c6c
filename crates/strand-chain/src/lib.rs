//! On-chain boundaries for strand state channels.
//!
//! The protocol engine touches the chain in exactly two ways, both modeled
//! here as traits so the engine stays testable without RPC access:
//!
//! - [`ChainReader`](reader::ChainReader) - read-only view of on-chain facts:
//!   deployed code, cumulative deposits, the transfer registry, dispute
//!   records, and predicate evaluation for transfer `create`/`resolve`.
//! - [`ChainSender`](sender::ChainSender) - submission of on-chain
//!   transactions (deploy, deposit, withdraw, dispute). The engine only
//!   queues and records these; it never blocks a channel update on them.
//!
//! [`Eip155ChainReader`](reader::Eip155ChainReader) is the production reader
//! over alloy JSON-RPC providers, with bounded retries and a per-chain cache
//! of registered transfer definitions.

pub mod contracts;
pub mod error;
pub mod reader;
pub mod rpc;
pub mod sender;

pub use error::ChainError;
pub use reader::{ChainReader, ChannelDispute, Eip155ChainReader, TransferEvaluator};
pub use sender::{ChainSender, ChainTransaction};
