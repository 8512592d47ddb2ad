//! Validator registry for the validator-selected acceptance policy
//!
//! Maps producer identity to stake. Entries are kept in a `BTreeMap` so that
//! iteration order, and therefore weighted selection for a given RNG state,
//! does not depend on hashing.

use crate::types::ProducerId;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stake held by each registered producer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    stakes: BTreeMap<ProducerId, u64>,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add stake for a producer, registering it if needed. Returns the new total.
    pub fn register(&mut self, producer: ProducerId, stake: u64) -> u64 {
        let entry = self.stakes.entry(producer).or_insert(0);
        *entry = entry.saturating_add(stake);
        *entry
    }

    /// Current stake (0 when unknown)
    pub fn stake_of(&self, producer: &ProducerId) -> u64 {
        self.stakes.get(producer).copied().unwrap_or(0)
    }

    /// Registered with non-zero stake
    pub fn is_eligible(&self, producer: &ProducerId) -> bool {
        self.stake_of(producer) > 0
    }

    /// Reset a producer's stake after it mints. Returns the consumed amount.
    pub fn consume(&mut self, producer: &ProducerId) -> u64 {
        match self.stakes.get_mut(producer) {
            Some(stake) => std::mem::take(stake),
            None => 0,
        }
    }

    /// Producers currently allowed to mint
    pub fn eligible(&self) -> impl Iterator<Item = (&ProducerId, u64)> + '_ {
        self.stakes
            .iter()
            .filter(|(_, stake)| **stake > 0)
            .map(|(id, stake)| (id, *stake))
    }

    /// Pick the next producer with probability proportional to stake.
    ///
    /// Returns `None` when nobody holds stake.
    pub fn select_weighted<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ProducerId> {
        let (ids, weights): (Vec<&ProducerId>, Vec<u64>) = self.eligible().unzip();
        let dist = WeightedIndex::new(&weights).ok()?;
        ids.get(dist.sample(rng)).map(|id| (*id).clone())
    }

    /// Number of registered producers (including exhausted ones)
    pub fn len(&self) -> usize {
        self.stakes.len()
    }

    /// No producers registered
    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_register_accumulates() {
        let mut registry = ValidatorRegistry::new();
        let alice = ProducerId::new("alice");

        assert_eq!(registry.register(alice.clone(), 10), 10);
        assert_eq!(registry.register(alice.clone(), 5), 15);
        assert_eq!(registry.stake_of(&alice), 15);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_consume_resets_stake() {
        let mut registry = ValidatorRegistry::new();
        let alice = ProducerId::new("alice");
        registry.register(alice.clone(), 7);

        assert!(registry.is_eligible(&alice));
        assert_eq!(registry.consume(&alice), 7);
        assert!(!registry.is_eligible(&alice));
        assert_eq!(registry.consume(&ProducerId::new("nobody")), 0);
    }

    #[test]
    fn test_select_weighted_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut registry = ValidatorRegistry::new();
        assert_eq!(registry.select_weighted(&mut rng), None);

        registry.register(ProducerId::new("broke"), 0);
        assert_eq!(registry.select_weighted(&mut rng), None);
    }

    #[test]
    fn test_select_weighted_only_eligible() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut registry = ValidatorRegistry::new();
        registry.register(ProducerId::new("alice"), 0);
        registry.register(ProducerId::new("bob"), 3);

        for _ in 0..50 {
            assert_eq!(
                registry.select_weighted(&mut rng),
                Some(ProducerId::new("bob"))
            );
        }
    }

    #[test]
    fn test_select_weighted_favours_stake() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut registry = ValidatorRegistry::new();
        registry.register(ProducerId::new("whale"), 99);
        registry.register(ProducerId::new("minnow"), 1);

        let whale_wins = (0..1000)
            .filter(|_| registry.select_weighted(&mut rng) == Some(ProducerId::new("whale")))
            .count();
        assert!(whale_wins > 900, "whale won {} of 1000", whale_wins);
    }
}
