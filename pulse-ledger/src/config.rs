//! Configuration for the ledger

use crate::policy::PolicyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Acceptance policy configuration
    pub policy: PolicyConfig,

    /// Submission coordinator configuration
    pub coordinator: CoordinatorConfig,

    /// TCP shell configuration
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "pulse-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            policy: PolicyConfig::default(),
            coordinator: CoordinatorConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Acceptance policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Which policy gates candidates
    pub kind: PolicyKind,

    /// Leading zero hex characters required (difficulty policy)
    pub difficulty: usize,

    /// Stake registered at startup (validator policy)
    pub initial_stakes: BTreeMap<String, u64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Difficulty,
            difficulty: 0,
            initial_stakes: BTreeMap::new(),
        }
    }
}

/// Submission coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Bounded mailbox size (backpressure on submitters)
    pub mailbox_capacity: usize,

    /// Events buffered per subscriber before the oldest are dropped
    pub broadcast_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            broadcast_capacity: 64,
        }
    }
}

/// TCP shell configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen address
    pub listen_addr: String,

    /// Seconds between chain dumps to each connection (0 disables)
    pub dump_interval_secs: u64,

    /// Emit JSON log lines
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9000".to_string(),
            dump_interval_secs: 30,
            log_json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    ///
    /// A `.env` file in the working directory is loaded first, without
    /// overriding variables already set. `LEDGER_CONFIG` names a TOML file
    /// used as the base; the remaining variables override individual fields.
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var("LEDGER_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // ADDR carries a bare port
        if let Some(port) = lookup("ADDR") {
            self.server.listen_addr = format!("0.0.0.0:{}", port.trim());
        }

        if let Some(addr) = lookup("LEDGER_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Some(kind) = lookup("LEDGER_POLICY") {
            self.policy.kind = PolicyKind::parse(&kind)
                .ok_or_else(|| crate::Error::Config(format!("Unknown policy: {}", kind)))?;
        }

        if let Some(value) = lookup("LEDGER_DIFFICULTY") {
            self.policy.difficulty = parse_number("LEDGER_DIFFICULTY", &value)?;
        }

        if let Some(value) = lookup("LEDGER_DUMP_INTERVAL_SECS") {
            self.server.dump_interval_secs = parse_number("LEDGER_DUMP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = lookup("LEDGER_BROADCAST_CAPACITY") {
            self.coordinator.broadcast_capacity =
                parse_number("LEDGER_BROADCAST_CAPACITY", &value)?;
        }

        if let Some(value) = lookup("LEDGER_MAILBOX_CAPACITY") {
            self.coordinator.mailbox_capacity = parse_number("LEDGER_MAILBOX_CAPACITY", &value)?;
        }

        if let Some(value) = lookup("LEDGER_LOG_JSON") {
            self.server.log_json = matches!(value.trim(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.coordinator.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "coordinator.mailbox_capacity must be > 0".to_string(),
            ));
        }

        if self.coordinator.broadcast_capacity == 0 {
            return Err(crate::Error::Config(
                "coordinator.broadcast_capacity must be > 0".to_string(),
            ));
        }

        // A SHA-256 hex digest has 64 characters
        if self.policy.difficulty > 64 {
            return Err(crate::Error::Config(format!(
                "policy.difficulty {} exceeds digest length",
                self.policy.difficulty
            )));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("{} is not a number: {}", key, value)))
}
