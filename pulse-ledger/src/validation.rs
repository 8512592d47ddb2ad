//! Chain validation
//!
//! Linkage and hash checks, independent of any acceptance policy. Every
//! check short-circuits on the first failure and reports why.

use crate::crypto::hash_block;
use crate::types::Block;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a candidate block or proposed chain was turned away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// `index` is not `tip.index + 1`
    IndexMismatch {
        /// Index the ledger expected
        expected: u64,
        /// Index the candidate carried
        found: u64,
    },
    /// `prev_hash` does not name the tip
    PrevHashMismatch,
    /// Stored hash differs from the recomputed one
    HashMismatch,
    /// Genesis block malformed
    InvalidGenesis,
    /// Proposed chain has a different genesis than the canonical one
    ForeignGenesis,
    /// Proposed chain is empty
    EmptyChain,
    /// Acceptance policy refused the candidate
    Policy(String),
}

impl Rejection {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::IndexMismatch { .. } => "index_mismatch",
            Rejection::PrevHashMismatch => "prev_hash_mismatch",
            Rejection::HashMismatch => "hash_mismatch",
            Rejection::InvalidGenesis => "invalid_genesis",
            Rejection::ForeignGenesis => "foreign_genesis",
            Rejection::EmptyChain => "empty_chain",
            Rejection::Policy(_) => "policy",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::IndexMismatch { expected, found } => {
                write!(f, "expected index {}, got {}", expected, found)
            }
            Rejection::PrevHashMismatch => write!(f, "previous hash does not match tip"),
            Rejection::HashMismatch => write!(f, "block hash does not match its fields"),
            Rejection::InvalidGenesis => write!(f, "invalid genesis block"),
            Rejection::ForeignGenesis => write!(f, "chain starts from a different genesis"),
            Rejection::EmptyChain => write!(f, "chain is empty"),
            Rejection::Policy(reason) => write!(f, "refused by policy: {}", reason),
        }
    }
}

/// Check that `candidate` is the correct successor of `tip`
pub fn check_link(candidate: &Block, tip: &Block) -> Result<(), Rejection> {
    let expected = tip.index + 1;
    if candidate.index != expected {
        return Err(Rejection::IndexMismatch {
            expected,
            found: candidate.index,
        });
    }

    if candidate.prev_hash != tip.hash {
        return Err(Rejection::PrevHashMismatch);
    }

    if hash_block(candidate) != candidate.hash {
        return Err(Rejection::HashMismatch);
    }

    Ok(())
}

/// Boolean form of [`check_link`]
pub fn is_valid(candidate: &Block, tip: &Block) -> bool {
    check_link(candidate, tip).is_ok()
}

/// Genesis: index 0, empty parent, self-consistent hash
pub fn check_genesis(block: &Block) -> Result<(), Rejection> {
    if block.index != 0 || !block.prev_hash.is_empty() || hash_block(block) != block.hash {
        return Err(Rejection::InvalidGenesis);
    }
    Ok(())
}

/// Validate a whole chain from genesis to tip
pub fn check_chain(blocks: &[Block]) -> Result<(), Rejection> {
    let genesis = blocks.first().ok_or(Rejection::EmptyChain)?;
    check_genesis(genesis)?;

    for pair in blocks.windows(2) {
        check_link(&pair[1], &pair[0])?;
    }

    Ok(())
}
