//! Pluggable acceptance policies
//!
//! A policy is the admission gate applied to a candidate after (or before,
//! the order does not change the result) the linkage checks in
//! [`crate::validation`]. Refusal is an outcome, never an error: the producer
//! may retry with new parameters.
//!
//! Two policies are provided:
//!
//! - [`DifficultyPolicy`]: the candidate's hash must start with `difficulty`
//!   zero hex characters. The block factory does not search a nonce space, so
//!   this is a pass/fail filter rather than mining.
//! - [`ValidatorPolicy`]: the candidate's producer must hold stake in the
//!   [`ValidatorRegistry`]; a successful mint consumes that stake.

use crate::config::PolicyConfig;
use crate::registry::ValidatorRegistry;
use crate::types::Block;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy selector used in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Leading-zero hash filter
    Difficulty,
    /// Staked validator eligibility
    Validator,
}

impl PolicyKind {
    /// Name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Difficulty => "difficulty",
            PolicyKind::Validator => "validator",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "difficulty" | "pow" => Some(PolicyKind::Difficulty),
            "validator" | "pos" => Some(PolicyKind::Validator),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Candidate may be appended
    Admitted,
    /// Candidate refused, with a reason for the producer
    Refused(String),
}

impl Admission {
    /// True when admitted
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Admission gate for candidate blocks
pub trait AcceptancePolicy: fmt::Debug + Send + Sync {
    /// Decide whether `candidate` is admissible
    fn admit(&self, candidate: &Block, registry: &ValidatorRegistry) -> Admission;

    /// Called once the candidate has been appended
    fn on_accepted(&self, _block: &Block, _registry: &mut ValidatorRegistry) {}

    /// Which policy this is
    fn kind(&self) -> PolicyKind;
}

/// Admits hashes with at least `difficulty` leading zero hex characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyPolicy {
    difficulty: usize,
}

impl DifficultyPolicy {
    /// Create with the given difficulty
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    /// Required leading zeros
    pub fn difficulty(&self) -> usize {
        self.difficulty
    }
}

impl AcceptancePolicy for DifficultyPolicy {
    fn admit(&self, candidate: &Block, _registry: &ValidatorRegistry) -> Admission {
        let zeros = candidate.hash.leading_zeros();
        if zeros >= self.difficulty {
            Admission::Admitted
        } else {
            Admission::Refused(format!(
                "hash has {} leading zeros, difficulty is {}",
                zeros, self.difficulty
            ))
        }
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Difficulty
    }
}

/// Admits blocks minted by a producer holding stake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorPolicy;

impl ValidatorPolicy {
    /// Create the policy
    pub fn new() -> Self {
        Self
    }
}

impl AcceptancePolicy for ValidatorPolicy {
    fn admit(&self, candidate: &Block, registry: &ValidatorRegistry) -> Admission {
        match &candidate.producer {
            None => Admission::Refused("block has no producer".to_string()),
            Some(producer) if registry.is_eligible(producer) => Admission::Admitted,
            Some(producer) => Admission::Refused(format!("{} holds no stake", producer)),
        }
    }

    fn on_accepted(&self, block: &Block, registry: &mut ValidatorRegistry) {
        if let Some(producer) = &block.producer {
            let consumed = registry.consume(producer);
            tracing::debug!(%producer, consumed, "Validator stake consumed");
        }
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Validator
    }
}

/// Build the configured policy
pub fn from_config(config: &PolicyConfig) -> Box<dyn AcceptancePolicy> {
    match config.kind {
        PolicyKind::Difficulty => Box::new(DifficultyPolicy::new(config.difficulty)),
        PolicyKind::Validator => Box::new(ValidatorPolicy::new()),
    }
}
