//! Pulse Ledger
//!
//! Append-only, hash-linked ledger of measurement blocks shared by many
//! concurrent producers.
//!
//! # Architecture
//!
//! - **Hash linkage**: every block commits to its parent's SHA-256 digest
//! - **Pluggable admission**: difficulty-gated or stake-gated acceptance
//! - **Single writer**: one coordinator task applies submissions in order
//! - **Fork choice**: a strictly longer, fully valid chain replaces the
//!   canonical one as a whole
//!
//! # Invariants
//!
//! - `index == parent.index + 1` for every non-genesis block
//! - `prev_hash == parent.hash` for every non-genesis block
//! - `hash == Hash(index, timestamp, payload, prev_hash[, producer])`
//! - The canonical chain never shrinks and never splices

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod factory;
pub mod ledger;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;
pub mod validation;

// Re-exports
pub use config::Config;
pub use coordinator::{ChainEvent, CoordinatorHandle, Subscription};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use policy::{AcceptancePolicy, DifficultyPolicy, PolicyKind, ValidatorPolicy};
pub use store::{AppendOutcome, LedgerStore, ReplaceOutcome};
pub use types::{Block, Digest, ProducerId};
pub use validation::Rejection;
