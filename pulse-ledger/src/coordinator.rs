//! Submission coordinator: single-writer actor plus state-change broadcast
//!
//! Producers never touch the ledger store's write path directly. They build a
//! candidate against the tip they last saw (outside any lock) and send it to
//! the coordinator, which applies submissions one at a time and publishes
//! the result to observers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Producer sessions (one per connection)         │
//! │     build candidate from snapshot tip (no lock)       │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ CoordinatorHandle (Clone)
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │            SubmissionCoordinator (single task)        │
//! │   LedgerStore::append / replace_if_longer (locked)    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ broadcast::channel (bounded,
//!                       │ slow receivers lose oldest)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                 Observers (Subscription)              │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::{
    config::CoordinatorConfig,
    factory,
    metrics::Metrics,
    store::{AppendOutcome, LedgerStore, ReplaceOutcome},
    types::{Block, ProducerId},
    Error, Result,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

/// State change published after every submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A block was appended and is the new tip
    TipAdvanced(Block),
    /// Fork choice swapped in a longer chain
    ChainReplaced {
        /// New chain length
        len: usize,
        /// New tip
        tip: Block,
    },
    /// The submission was rejected; the chain is as it was
    Unchanged {
        /// Index of the unchanged tip
        tip_index: u64,
    },
}

/// Message sent to the coordinator
enum CoordinatorMessage {
    /// Append a pre-built candidate
    SubmitCandidate {
        block: Block,
        response: oneshot::Sender<AppendOutcome>,
    },

    /// Offer a whole chain for fork choice
    ProposeChain {
        blocks: Vec<Block>,
        response: oneshot::Sender<ReplaceOutcome>,
    },

    /// Shutdown actor
    Shutdown,
}

impl std::fmt::Debug for CoordinatorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorMessage::SubmitCandidate { block, .. } => f
                .debug_struct("SubmitCandidate")
                .field("index", &block.index)
                .finish(),
            CoordinatorMessage::ProposeChain { blocks, .. } => f
                .debug_struct("ProposeChain")
                .field("len", &blocks.len())
                .finish(),
            CoordinatorMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Actor that serializes submissions
struct SubmissionCoordinator {
    store: Arc<LedgerStore>,
    mailbox: mpsc::Receiver<CoordinatorMessage>,
    events: broadcast::Sender<ChainEvent>,
    metrics: Metrics,
}

impl SubmissionCoordinator {
    /// Run the actor event loop
    async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                CoordinatorMessage::SubmitCandidate { block, response } => {
                    let outcome = self.apply_candidate(block);
                    let _ = response.send(outcome);
                }

                CoordinatorMessage::ProposeChain { blocks, response } => {
                    let outcome = self.apply_chain(blocks);
                    let _ = response.send(outcome);
                }

                CoordinatorMessage::Shutdown => break,
            }
        }

        tracing::debug!("Submission coordinator stopped");
    }

    fn apply_candidate(&self, block: Block) -> AppendOutcome {
        let start = Instant::now();
        let outcome = self.store.append(block);
        self.metrics.record_append_duration(start.elapsed().as_secs_f64());

        match &outcome {
            AppendOutcome::Accepted(block) => {
                self.metrics.record_accepted(self.store.len());
                self.publish(ChainEvent::TipAdvanced(block.clone()));
            }
            AppendOutcome::Rejected(rejection) => {
                tracing::info!(%rejection, "Candidate rejected");
                self.metrics.record_rejected(rejection.label());
                self.publish_unchanged();
            }
        }

        outcome
    }

    fn apply_chain(&self, blocks: Vec<Block>) -> ReplaceOutcome {
        let outcome = self.store.replace_if_longer(blocks);

        match &outcome {
            ReplaceOutcome::Replaced { len } => {
                self.metrics.record_replacement(*len);
                self.publish(ChainEvent::ChainReplaced {
                    len: *len,
                    tip: self.store.tip(),
                });
            }
            ReplaceOutcome::NotLonger { proposed, canonical } => {
                tracing::debug!(proposed, canonical, "Proposed chain not longer");
                self.publish_unchanged();
            }
            ReplaceOutcome::Invalid(rejection) => {
                tracing::warn!(%rejection, "Proposed chain invalid");
                self.metrics.record_rejected(rejection.label());
                self.publish_unchanged();
            }
        }

        outcome
    }

    fn publish_unchanged(&self) {
        self.publish(ChainEvent::Unchanged {
            tip_index: self.store.tip().index,
        });
    }

    fn publish(&self, event: ChainEvent) {
        // Err only means nobody is subscribed
        if self.events.send(event).is_err() {
            tracing::trace!("No subscribers for chain event");
        }
    }
}

/// Handle for submitting to the coordinator and reading the ledger
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    events: broadcast::Sender<ChainEvent>,
    store: Arc<LedgerStore>,
    metrics: Metrics,
}

impl CoordinatorHandle {
    /// Build a candidate on the current tip and submit it
    pub async fn submit(
        &self,
        payload: i64,
        producer: Option<ProducerId>,
    ) -> Result<AppendOutcome> {
        let tip = self.store.tip();
        let candidate = factory::build(&tip, payload, producer);
        self.submit_candidate(candidate).await
    }

    /// Submit a pre-built candidate
    pub async fn submit_candidate(&self, block: Block) -> Result<AppendOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::SubmitCandidate {
                block,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Coordinator mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Offer a whole chain for fork choice
    pub async fn propose_chain(&self, blocks: Vec<Block>) -> Result<ReplaceOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::ProposeChain {
                blocks,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Coordinator mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Point-in-time copy of the canonical chain
    pub fn snapshot(&self) -> Vec<Block> {
        self.store.snapshot()
    }

    /// Current tip
    pub fn tip(&self) -> Block {
        self.store.tip()
    }

    /// Add stake for a producer
    pub fn register_validator(&self, producer: ProducerId, stake: u64) -> u64 {
        self.store.register_validator(producer, stake)
    }

    /// Weighted-random pick of the next eligible producer
    pub fn select_producer(&self) -> Option<ProducerId> {
        self.store.select_producer(&mut rand::thread_rng())
    }

    /// Subscribe to chain events from now on
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.events.subscribe(),
        }
    }

    /// Metrics recorded by the coordinator
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying store (read access)
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CoordinatorMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Coordinator mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Receiving end of the chain event broadcast.
///
/// A subscriber that falls more than the configured capacity behind loses
/// the oldest events; the publisher never waits for it.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ChainEvent>,
}

impl Subscription {
    /// Next event, skipping over any that were dropped while lagging.
    ///
    /// Returns `None` once every handle and the coordinator are gone.
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, oldest chain events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Same events as a stream; lag is skipped silently
    pub fn into_stream(self) -> impl Stream<Item = ChainEvent> {
        BroadcastStream::new(self.receiver).filter_map(|event| event.ok())
    }
}

/// Spawn the coordinator
pub fn spawn_coordinator(
    store: Arc<LedgerStore>,
    config: &CoordinatorConfig,
    metrics: Metrics,
) -> CoordinatorHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity);
    let (events, _) = broadcast::channel(config.broadcast_capacity);
    metrics.chain_length.set(store.len() as i64);

    let coordinator = SubmissionCoordinator {
        store: store.clone(),
        mailbox: rx,
        events: events.clone(),
        metrics: metrics.clone(),
    };

    tokio::spawn(async move {
        coordinator.run().await;
    });

    CoordinatorHandle {
        sender: tx,
        events,
        store,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DifficultyPolicy;
    use crate::validation::Rejection;

    fn spawn_with_capacity(broadcast_capacity: usize) -> (CoordinatorHandle, Metrics) {
        let store = Arc::new(
            LedgerStore::new(factory::genesis(), Box::new(DifficultyPolicy::new(0))).unwrap(),
        );
        let config = CoordinatorConfig {
            mailbox_capacity: 100,
            broadcast_capacity,
        };
        let metrics = Metrics::new().unwrap();
        (spawn_coordinator(store, &config, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_submit_and_shutdown() {
        let (handle, metrics) = spawn_with_capacity(16);

        let outcome = handle.submit(60, None).await.unwrap();
        let block = match outcome {
            AppendOutcome::Accepted(block) => block,
            other => panic!("expected acceptance, got {:?}", other),
        };
        assert_eq!(block.index, 1);
        assert_eq!(handle.snapshot().len(), 2);
        assert_eq!(metrics.blocks_accepted.get(), 1);
        assert_eq!(metrics.chain_length.get(), 2);

        handle.shutdown().await.unwrap();
        assert!(handle.submit(61, None).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_candidates_on_same_tip() {
        let (handle, metrics) = spawn_with_capacity(64);
        let tip = handle.tip();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let handle = handle.clone();
                let candidate = factory::build(&tip, 60 + i, None);
                tokio::spawn(async move { handle.submit_candidate(candidate).await.unwrap() })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap().is_accepted() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(handle.snapshot().len(), 2);
        assert_eq!(
            metrics
                .candidates_rejected
                .with_label_values(&["index_mismatch"])
                .get(),
            19
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_tip_and_unchanged() {
        let (handle, _) = spawn_with_capacity(16);
        let mut subscription = handle.subscribe();
        let genesis = handle.tip();

        let accepted = handle.submit(60, None).await.unwrap();
        let stale = factory::build(&genesis, 75, None);
        let rejected = handle.submit_candidate(stale).await.unwrap();

        assert!(accepted.is_accepted());
        assert_eq!(
            rejected,
            AppendOutcome::Rejected(Rejection::IndexMismatch {
                expected: 2,
                found: 1,
            })
        );

        match subscription.recv().await {
            Some(ChainEvent::TipAdvanced(block)) => assert_eq!(block.payload, 60),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            subscription.recv().await,
            Some(ChainEvent::Unchanged { tip_index: 1 })
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block() {
        let (handle, _) = spawn_with_capacity(2);
        let mut slow = handle.subscribe();

        for payload in 0..10 {
            assert!(handle.submit(payload, None).await.unwrap().is_accepted());
        }

        // Only the newest events survive
        match slow.recv().await {
            Some(ChainEvent::TipAdvanced(block)) => assert_eq!(block.index, 9),
            other => panic!("unexpected event {:?}", other),
        }
        match slow.recv().await {
            Some(ChainEvent::TipAdvanced(block)) => assert_eq!(block.index, 10),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_propose_longer_chain() {
        let (handle, metrics) = spawn_with_capacity(16);
        let mut events = handle.subscribe().into_stream();

        let mut fork = handle.snapshot();
        for payload in [70, 71, 72] {
            let parent = fork.last().unwrap().clone();
            fork.push(factory::build(&parent, payload, None));
        }

        let outcome = handle.propose_chain(fork.clone()).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::Replaced { len: 4 });
        assert_eq!(metrics.chain_replacements.get(), 1);

        let event = events.next().await.unwrap();
        assert_eq!(
            event,
            ChainEvent::ChainReplaced {
                len: 4,
                tip: fork[3].clone()
            }
        );

        let outcome = handle.propose_chain(fork[..2].to_vec()).await.unwrap();
        assert!(!outcome.is_replaced());
        assert_eq!(handle.snapshot(), fork);
    }
}
