//! Hashing for the ledger
//!
//! This module provides:
//! - SHA-256 digests over a block's canonical fields
//! - Recomputation of a block's hash for validation
//!
//! The canonical record is the plain concatenation of the decimal index, the
//! timestamp string, the decimal payload, the parent hash (hex) and, when the
//! block carries one, the producer identity.

use crate::types::{Block, Digest, ProducerId};
use sha2::{Digest as _, Sha256};

/// Hash a block's fields into a hex digest.
///
/// Two producers minting otherwise identical blocks get different digests.
pub fn hash_fields(
    index: u64,
    timestamp: &str,
    payload: i64,
    prev_hash: &Digest,
    producer: Option<&ProducerId>,
) -> Digest {
    let mut record = String::with_capacity(timestamp.len() + prev_hash.as_str().len() + 40);
    record.push_str(&index.to_string());
    record.push_str(timestamp);
    record.push_str(&payload.to_string());
    record.push_str(prev_hash.as_str());
    if let Some(producer) = producer {
        record.push_str(producer.as_str());
    }

    Digest::from_bytes(&hash_bytes(record.as_bytes()))
}

/// Recompute the hash of a block from its own fields
pub fn hash_block(block: &Block) -> Digest {
    hash_fields(
        block.index,
        &block.timestamp,
        block.payload,
        &block.prev_hash,
        block.producer.as_ref(),
    )
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes() {
        let hash1 = hash_bytes(b"test data");
        let hash2 = hash_bytes(b"test data");
        assert_eq!(hash1, hash2);

        let hash3 = hash_bytes(b"different data");
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_known_vector() {
        // sha256("1" + "t" + "60" + "")
        let digest = hash_fields(1, "t", 60, &Digest::empty(), None);
        assert_eq!(digest, Digest::from_bytes(&hash_bytes(b"1t60")));
        assert_eq!(digest.as_str().len(), 64);
    }

    #[test]
    fn test_hash_fields_deterministic() {
        let prev = Digest::from_hex("abcd");
        let a = hash_fields(7, "2024-01-01T00:00:00Z", 72, &prev, None);
        let b = hash_fields(7, "2024-01-01T00:00:00Z", 72, &prev, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_producer_changes_digest() {
        let prev = Digest::from_hex("abcd");
        let alice = ProducerId::new("alice");
        let bob = ProducerId::new("bob");

        let none = hash_fields(3, "ts", 80, &prev, None);
        let a = hash_fields(3, "ts", 80, &prev, Some(&alice));
        let b = hash_fields(3, "ts", 80, &prev, Some(&bob));

        assert_ne!(none, a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_block_matches_fields() {
        let block = Block {
            index: 2,
            timestamp: "ts".to_string(),
            payload: -5,
            prev_hash: Digest::from_hex("00ff"),
            hash: Digest::empty(),
            producer: None,
        };

        assert_eq!(
            hash_block(&block),
            hash_fields(2, "ts", -5, &Digest::from_hex("00ff"), None)
        );
    }
}
