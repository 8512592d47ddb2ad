//! Block construction
//!
//! Building a block never fails and never touches the ledger store; whether
//! the candidate is admissible is decided later by
//! [`crate::validation`] and the configured [`crate::policy`].

use crate::crypto::hash_fields;
use crate::types::{Block, Digest, ProducerId};
use chrono::{SecondsFormat, Utc};

/// Current wall-clock time in the ledger's timestamp format
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Build the genesis block: index 0, empty parent, payload 0.
pub fn genesis() -> Block {
    genesis_at(now_timestamp())
}

/// Build the genesis block with an explicit timestamp
pub fn genesis_at(timestamp: impl Into<String>) -> Block {
    let timestamp = timestamp.into();
    let prev_hash = Digest::empty();
    let hash = hash_fields(0, &timestamp, 0, &prev_hash, None);

    Block {
        index: 0,
        timestamp,
        payload: 0,
        prev_hash,
        hash,
        producer: None,
    }
}

/// Build a candidate block on top of `parent`
pub fn build(parent: &Block, payload: i64, producer: Option<ProducerId>) -> Block {
    build_at(parent, payload, producer, now_timestamp())
}

/// Build a candidate block with an explicit timestamp
pub fn build_at(
    parent: &Block,
    payload: i64,
    producer: Option<ProducerId>,
    timestamp: impl Into<String>,
) -> Block {
    let index = parent.index + 1;
    let timestamp = timestamp.into();
    let prev_hash = parent.hash.clone();
    let hash = hash_fields(index, &timestamp, payload, &prev_hash, producer.as_ref());

    Block {
        index,
        timestamp,
        payload,
        prev_hash,
        hash,
        producer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_block;

    #[test]
    fn test_genesis_shape() {
        let genesis = genesis();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.payload, 0);
        assert!(genesis.prev_hash.is_empty());
        assert_eq!(hash_block(&genesis), genesis.hash);
    }

    #[test]
    fn test_build_links_to_parent() {
        let genesis = genesis();
        let block = build(&genesis, 60, None);

        assert_eq!(block.index, 1);
        assert_eq!(block.prev_hash, genesis.hash);
        assert_eq!(block.payload, 60);
        assert_eq!(hash_block(&block), block.hash);
        assert!(block.producer.is_none());
    }

    #[test]
    fn test_build_attaches_producer() {
        let genesis = genesis_at("t0");
        let block = build_at(&genesis, 72, Some(ProducerId::new("alice")), "t1");

        assert_eq!(block.producer, Some(ProducerId::new("alice")));
        assert_eq!(hash_block(&block), block.hash);
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = now_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
