//! Core types for the ledger
//!
//! All types are designed for:
//! - Immutability once hashed (no setters on [`Block`])
//! - Stable textual encoding (hex digests, RFC 3339 timestamps)
//! - Direct JSON rendering by the shell (serde)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a block producer (validator name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerId(String);

impl ProducerId {
    /// Create new producer ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lowercase hex rendering of a SHA-256 digest.
///
/// The empty digest is reserved for the genesis block's `prev_hash`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// The empty digest (genesis parent)
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Wrap an already-encoded hex string
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Encode raw digest bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the genesis parent digest
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of leading `'0'` hex characters
    pub fn leading_zeros(&self) -> usize {
        self.0.chars().take_while(|c| *c == '0').count()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One hash-linked ledger entry.
///
/// Fields are public for reading and for the shell's serialization, but a
/// block is never changed after [`crate::factory`] computes its hash; any
/// mutation makes it fail [`crate::validation::check_link`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height, 0 for genesis
    pub index: u64,

    /// Wall-clock creation time (RFC 3339), informational only
    pub timestamp: String,

    /// Measurement value
    pub payload: i64,

    /// Hash of the parent block (empty for genesis)
    pub prev_hash: Digest,

    /// Hash of this block's fields
    pub hash: Digest,

    /// Minting validator (validator-selected policy only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<ProducerId>,
}

impl Block {
    /// Genesis blocks are exempt from linkage checks
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
