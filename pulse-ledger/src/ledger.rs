//! Main ledger orchestration layer
//!
//! This module ties together the store, acceptance policy, metrics and the
//! submission coordinator into one high-level entry point.
//!
//! # Example
//!
//! ```no_run
//! use pulse_ledger::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> pulse_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let outcome = ledger.handle().submit(72, None).await?;
//!     assert!(outcome.is_accepted());
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    coordinator::{spawn_coordinator, CoordinatorHandle},
    factory,
    metrics::Metrics,
    policy,
    store::LedgerStore,
    types::{Block, ProducerId},
    Config, Result,
};
use std::sync::Arc;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Coordinator handle for submissions and reads
    handle: CoordinatorHandle,

    /// Metrics shared with the coordinator
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open a ledger with a fresh genesis block.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_genesis(config, factory::genesis())
    }

    /// Open a ledger rooted at the given genesis block
    pub fn open_with_genesis(config: Config, genesis: Block) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(LedgerStore::new(genesis, policy::from_config(&config.policy))?);
        for (producer, stake) in &config.policy.initial_stakes {
            store.register_validator(ProducerId::new(producer.as_str()), *stake);
        }

        let metrics = Metrics::new()?;
        let handle = spawn_coordinator(store, &config.coordinator, metrics.clone());

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            policy = %config.policy.kind,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            metrics,
            config,
        })
    }

    /// Handle for submissions, queries and subscriptions
    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
