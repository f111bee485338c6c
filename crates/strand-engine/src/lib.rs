//! The strand update protocol engine.
//!
//! Given a locally proposed update or a remotely received one, the engine
//! validates it against the previous channel state and on-chain facts,
//! applies it deterministically, produces signatures on the resulting
//! commitment, exchanges those signatures with the counterparty, and
//! persists the result.
//!
//! # Guarantees
//!
//! - strict monotonic nonce ordering with at most one outstanding proposal
//!   per channel at a time;
//! - bilateral signatures on every durable state;
//! - one-step sync when the two parties disagree on which state is latest;
//! - reconciliation between on-chain deposit totals and off-chain balances;
//! - deterministic application of the four update types, with transfer
//!   predicates evaluated against the chain.
//!
//! # Architecture
//!
//! The validator and applier ([`validate`]-internal, [`apply`]-internal) are
//! shared by the outbound and inbound flows, so both replicas derive the
//! next state through identical code. [`ProtocolEngine`] orchestrates:
//! per-channel locks, the message round-trip, sync on divergence, and
//! persistence as the final step of every flow.

mod apply;
mod engine;
mod error;
mod events;
mod external;
mod inbound;
mod locks;
mod messaging;
mod outbound;
mod queue;
mod sync;
mod validate;

pub use engine::ProtocolEngine;
pub use error::{EngineError, ValidationError};
pub use events::{EngineEvent, EventBus};
pub use external::{AcceptAll, ExternalValidation};
pub use messaging::{InboundProtocolUpdate, MessagingError, ProtocolMessenger, memory};
pub use queue::TransactionQueue;

#[cfg(test)]
pub(crate) mod testing;
