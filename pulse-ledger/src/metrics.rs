//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_blocks_accepted_total` - Blocks appended to the canonical chain
//! - `ledger_candidates_rejected_total{reason}` - Rejected candidates by reason
//! - `ledger_chain_replacements_total` - Fork-choice replacements
//! - `ledger_chain_length` - Current canonical chain length
//! - `ledger_append_duration_seconds` - Histogram of append latencies
//!
//! Every [`Metrics`] owns its own registry so several ledgers (and tests) can
//! coexist in one process.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Blocks appended
    pub blocks_accepted: IntCounter,

    /// Candidates rejected, labelled by reason
    pub candidates_rejected: IntCounterVec,

    /// Fork-choice replacements
    pub chain_replacements: IntCounter,

    /// Canonical chain length
    pub chain_length: IntGauge,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let blocks_accepted = IntCounter::new(
            "ledger_blocks_accepted_total",
            "Blocks appended to the canonical chain",
        )?;
        registry.register(Box::new(blocks_accepted.clone()))?;

        let candidates_rejected = IntCounterVec::new(
            Opts::new(
                "ledger_candidates_rejected_total",
                "Candidate blocks rejected, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(candidates_rejected.clone()))?;

        let chain_replacements = IntCounter::new(
            "ledger_chain_replacements_total",
            "Canonical chain replaced by a longer proposal",
        )?;
        registry.register(Box::new(chain_replacements.clone()))?;

        let chain_length = IntGauge::new("ledger_chain_length", "Canonical chain length")?;
        registry.register(Box::new(chain_length.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        Ok(Self {
            blocks_accepted,
            candidates_rejected,
            chain_replacements,
            chain_length,
            append_duration,
            registry,
        })
    }

    /// Record an appended block
    pub fn record_accepted(&self, chain_length: usize) {
        self.blocks_accepted.inc();
        self.chain_length.set(chain_length as i64);
    }

    /// Record a rejected candidate
    pub fn record_rejected(&self, reason: &str) {
        self.candidates_rejected.with_label_values(&[reason]).inc();
    }

    /// Record a fork-choice replacement
    pub fn record_replacement(&self, chain_length: usize) {
        self.chain_replacements.inc();
        self.chain_length.set(chain_length as i64);
    }

    /// Record append duration
    pub fn record_append_duration(&self, duration_seconds: f64) {
        self.append_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render in the Prometheus text format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Other(e.to_string()))
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("blocks_accepted", &self.blocks_accepted.get())
            .field("chain_replacements", &self.chain_replacements.get())
            .field("chain_length", &self.chain_length.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.blocks_accepted.get(), 0);
        assert_eq!(metrics.chain_length.get(), 0);

        // Per-instance registries never collide
        let _second = Metrics::new().unwrap();
    }

    #[test]
    fn test_record_accepted() {
        let metrics = Metrics::new().unwrap();
        metrics.record_accepted(2);
        metrics.record_accepted(3);
        assert_eq!(metrics.blocks_accepted.get(), 2);
        assert_eq!(metrics.chain_length.get(), 3);
    }

    #[test]
    fn test_record_rejected_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejected("index_mismatch");
        metrics.record_rejected("index_mismatch");
        metrics.record_rejected("policy");

        assert_eq!(
            metrics
                .candidates_rejected
                .with_label_values(&["index_mismatch"])
                .get(),
            2
        );
        assert_eq!(
            metrics.candidates_rejected.with_label_values(&["policy"]).get(),
            1
        );
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_replacement(5);
        metrics.record_append_duration(0.001);

        let text = metrics.render().unwrap();
        assert!(text.contains("ledger_chain_replacements_total 1"));
        assert!(text.contains("ledger_chain_length 5"));
    }
}
