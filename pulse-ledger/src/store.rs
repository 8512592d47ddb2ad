//! Ledger store: the canonical chain and validator registry
//!
//! All mutation happens under one `parking_lot::RwLock`. Reading the tip,
//! validating the candidate against it, running the acceptance policy and
//! pushing the block form a single critical section, so two candidates built
//! on the same tip can never both be appended. Snapshots take the read lock
//! and therefore never observe a half-finished append.
//!
//! Work that does not need the lock (building candidates, re-hashing a
//! proposed chain) is done by the caller or before the lock is taken.

use crate::{
    policy::{AcceptancePolicy, Admission, PolicyKind},
    registry::ValidatorRegistry,
    types::{Block, Digest, ProducerId},
    validation::{check_chain, check_genesis, check_link, Rejection},
    Error, Result,
};
use parking_lot::RwLock;
use rand::Rng;

/// Result of [`LedgerStore::append`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Block is now the tip
    Accepted(Block),
    /// Chain left unchanged
    Rejected(Rejection),
}

impl AppendOutcome {
    /// True when the block was appended
    pub fn is_accepted(&self) -> bool {
        matches!(self, AppendOutcome::Accepted(_))
    }
}

/// Result of [`LedgerStore::replace_if_longer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Canonical chain swapped for the proposal
    Replaced {
        /// New chain length
        len: usize,
    },
    /// Proposal not strictly longer; nothing changed
    NotLonger {
        /// Proposed length
        proposed: usize,
        /// Canonical length
        canonical: usize,
    },
    /// Proposal failed validation; nothing changed
    Invalid(Rejection),
}

impl ReplaceOutcome {
    /// True when the canonical chain was replaced
    pub fn is_replaced(&self) -> bool {
        matches!(self, ReplaceOutcome::Replaced { .. })
    }
}

#[derive(Debug)]
struct State {
    /// Never empty: index 0 is genesis
    chain: Vec<Block>,
    registry: ValidatorRegistry,
}

impl State {
    fn tip(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }
}

/// Owner of the canonical chain
#[derive(Debug)]
pub struct LedgerStore {
    state: RwLock<State>,
    policy: Box<dyn AcceptancePolicy>,
    genesis_hash: Digest,
}

impl LedgerStore {
    /// Create a store rooted at `genesis`.
    ///
    /// Fails with [`Error::InvariantViolation`] if the genesis block is not
    /// self-consistent; the ledger must not serve from a corrupt base.
    pub fn new(genesis: Block, policy: Box<dyn AcceptancePolicy>) -> Result<Self> {
        check_genesis(&genesis).map_err(|rejection| {
            Error::InvariantViolation(format!("genesis block rejected: {}", rejection))
        })?;

        tracing::info!(
            genesis_hash = %genesis.hash,
            policy = %policy.kind(),
            "Ledger store initialised"
        );

        Ok(Self {
            genesis_hash: genesis.hash.clone(),
            state: RwLock::new(State {
                chain: vec![genesis],
                registry: ValidatorRegistry::new(),
            }),
            policy,
        })
    }

    /// Validate `candidate` against the current tip and append it.
    pub fn append(&self, candidate: Block) -> AppendOutcome {
        let mut state = self.state.write();

        if let Err(rejection) = check_link(&candidate, state.tip()) {
            tracing::debug!(index = candidate.index, %rejection, "Candidate failed linkage");
            return AppendOutcome::Rejected(rejection);
        }

        if let Admission::Refused(reason) = self.policy.admit(&candidate, &state.registry) {
            tracing::debug!(index = candidate.index, %reason, "Candidate refused by policy");
            return AppendOutcome::Rejected(Rejection::Policy(reason));
        }

        let State { chain, registry } = &mut *state;
        self.policy.on_accepted(&candidate, registry);
        chain.push(candidate.clone());

        tracing::debug!(index = candidate.index, hash = %candidate.hash, "Block appended");
        AppendOutcome::Accepted(candidate)
    }

    /// Fork choice: adopt `proposed` iff it is valid, shares our genesis and
    /// is strictly longer than the canonical chain.
    pub fn replace_if_longer(&self, proposed: Vec<Block>) -> ReplaceOutcome {
        // Hashing every block is the expensive part; do it before locking.
        if let Err(rejection) = check_chain(&proposed) {
            return ReplaceOutcome::Invalid(rejection);
        }
        if proposed[0].hash != self.genesis_hash {
            return ReplaceOutcome::Invalid(Rejection::ForeignGenesis);
        }

        let mut state = self.state.write();
        let canonical = state.chain.len();
        if proposed.len() <= canonical {
            return ReplaceOutcome::NotLonger {
                proposed: proposed.len(),
                canonical,
            };
        }

        let len = proposed.len();
        state.chain = proposed;
        tracing::info!(from = canonical, to = len, "Canonical chain replaced");
        ReplaceOutcome::Replaced { len }
    }

    /// Point-in-time copy of the canonical chain
    pub fn snapshot(&self) -> Vec<Block> {
        self.state.read().chain.clone()
    }

    /// Most recent block
    pub fn tip(&self) -> Block {
        self.state.read().tip().clone()
    }

    /// Number of blocks including genesis
    pub fn len(&self) -> usize {
        self.state.read().chain.len()
    }

    /// Always false: the chain holds at least genesis
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Hash of the genesis block
    pub fn genesis_hash(&self) -> &Digest {
        &self.genesis_hash
    }

    /// Active acceptance policy
    pub fn policy_kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// Add stake for a producer. Returns its new total.
    pub fn register_validator(&self, producer: ProducerId, stake: u64) -> u64 {
        let total = self.state.write().registry.register(producer.clone(), stake);
        tracing::info!(%producer, stake, total, "Validator registered");
        total
    }

    /// Current stake of a producer
    pub fn stake_of(&self, producer: &ProducerId) -> u64 {
        self.state.read().registry.stake_of(producer)
    }

    /// Weighted-random choice of the next eligible producer
    pub fn select_producer<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ProducerId> {
        self.state.read().registry.select_weighted(rng)
    }

    /// Copy of the validator registry
    pub fn registry(&self) -> ValidatorRegistry {
        self.state.read().registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{build, build_at, genesis, genesis_at};
    use crate::policy::{DifficultyPolicy, ValidatorPolicy};
    use std::sync::Arc;

    fn open_store() -> LedgerStore {
        LedgerStore::new(genesis(), Box::new(DifficultyPolicy::new(0))).unwrap()
    }

    fn extend(chain: &mut Vec<Block>, n: usize) {
        for i in 0..n {
            let parent = chain.last().unwrap().clone();
            chain.push(build_at(&parent, 60 + i as i64, None, format!("fork-{}", i)));
        }
    }

    #[test]
    fn test_corrupt_genesis_refused() {
        let mut genesis = genesis();
        genesis.payload = 99;

        let err = LedgerStore::new(genesis, Box::new(DifficultyPolicy::new(0))).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_append_and_tip() {
        let store = open_store();
        let candidate = build(&store.tip(), 60, None);

        let outcome = store.append(candidate.clone());
        assert_eq!(outcome, AppendOutcome::Accepted(candidate.clone()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.tip(), candidate);
    }

    #[test]
    fn test_resubmission_rejected() {
        let store = open_store();
        let candidate = build(&store.tip(), 60, None);

        assert!(store.append(candidate.clone()).is_accepted());
        assert_eq!(
            store.append(candidate),
            AppendOutcome::Rejected(Rejection::IndexMismatch {
                expected: 2,
                found: 1,
            })
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_policy_refusal_leaves_chain() {
        let store = LedgerStore::new(genesis(), Box::new(DifficultyPolicy::new(64))).unwrap();
        let candidate = build(&store.tip(), 60, None);

        let outcome = store.append(candidate);
        assert!(matches!(outcome, AppendOutcome::Rejected(Rejection::Policy(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_validator_policy_consumes_stake() {
        let store = LedgerStore::new(genesis(), Box::new(ValidatorPolicy::new())).unwrap();
        let alice = ProducerId::new("alice");

        let unstaked = build(&store.tip(), 60, Some(alice.clone()));
        assert!(!store.append(unstaked).is_accepted());

        store.register_validator(alice.clone(), 3);
        let staked = build(&store.tip(), 61, Some(alice.clone()));
        assert!(store.append(staked).is_accepted());
        assert_eq!(store.stake_of(&alice), 0);

        let again = build(&store.tip(), 62, Some(alice));
        assert!(!store.append(again).is_accepted());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_appends_single_winner() {
        let store = Arc::new(open_store());
        let tip = store.tip();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let candidate = build(&tip, 60 + i, None);
                std::thread::spawn(move || store.append(candidate).is_accepted())
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_replace_if_longer() {
        let store = open_store();
        let mut fork = store.snapshot();
        extend(&mut fork, 3);

        assert_eq!(
            store.replace_if_longer(fork.clone()),
            ReplaceOutcome::Replaced { len: 4 }
        );
        assert_eq!(store.snapshot(), fork);
    }

    #[test]
    fn test_replace_never_shortens() {
        let store = open_store();
        let tip = store.tip();
        store.append(build(&tip, 60, None));
        let tip = store.tip();
        store.append(build(&tip, 61, None));
        let before = store.snapshot();

        let mut shorter = vec![before[0].clone()];
        extend(&mut shorter, 1);
        assert!(!store.replace_if_longer(shorter).is_replaced());

        let mut equal = vec![before[0].clone()];
        extend(&mut equal, 2);
        assert_eq!(
            store.replace_if_longer(equal),
            ReplaceOutcome::NotLonger {
                proposed: 3,
                canonical: 3,
            }
        );
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_replace_rejects_invalid_or_foreign() {
        let store = open_store();

        let mut tampered = store.snapshot();
        extend(&mut tampered, 3);
        tampered[2].payload = 1000;
        assert_eq!(
            store.replace_if_longer(tampered),
            ReplaceOutcome::Invalid(Rejection::HashMismatch)
        );

        let mut foreign = vec![genesis_at("elsewhere")];
        extend(&mut foreign, 3);
        assert_eq!(
            store.replace_if_longer(foreign),
            ReplaceOutcome::Invalid(Rejection::ForeignGenesis)
        );

        assert_eq!(
            store.replace_if_longer(Vec::new()),
            ReplaceOutcome::Invalid(Rejection::EmptyChain)
        );
        assert_eq!(store.len(), 1);
    }
}
