use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::model::vote::{NewVote, VoteRecord};
use crate::model::{ElectionId, VoterHash};

/// Errors produced by a ledger store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The uniqueness constraint on `(election_id, voter_hash)` rejected
    /// the write.
    #[error("a record already exists for this voter in this election")]
    Duplicate,
    /// The backend could not service the request. Retryable: the
    /// uniqueness constraint makes a repeated append safe.
    #[error("{0}")]
    Unavailable(String),
}

/// Append-only storage for vote chains.
///
/// `append` is the integrity-critical primitive. Implementations must make
/// the tip read, chain extension and insert a single atomic step, and must
/// enforce uniqueness of `(election_id, voter_hash)` inside that same step:
/// concurrent appends for one key see exactly one success and
/// [`StoreError::Duplicate`] otherwise. Callers never check-then-write.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically extend the election's chain with `vote`.
    async fn append(&self, vote: NewVote) -> Result<VoteRecord, StoreError>;

    /// The record for one voter in one election, if any.
    async fn record_for_voter(
        &self,
        election_id: ElectionId,
        voter_hash: &str,
    ) -> Result<Option<VoteRecord>, StoreError>;

    /// Every record for an election, in block-index order.
    async fn records(&self, election_id: ElectionId) -> Result<Vec<VoteRecord>, StoreError>;
}

/// One election's chain plus its per-voter uniqueness index.
#[derive(Debug, Default)]
struct Chain {
    records: Vec<VoteRecord>,
    voters: HashMap<VoterHash, usize>,
}

/// In-memory ledger store.
///
/// A single mutex serialises every append, which makes the store's history
/// linearizable; a database-backed implementation gets the same guarantee
/// from a unique index and an atomic insert-or-fail, never from
/// orchestrator-side locking.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    chains: Mutex<HashMap<ElectionId, Chain>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, vote: NewVote) -> Result<VoteRecord, StoreError> {
        let mut chains = self.chains.lock().await;
        let chain = chains.entry(vote.election_id).or_default();
        if chain.voters.contains_key(&vote.voter_hash) {
            return Err(StoreError::Duplicate);
        }
        let record = VoteRecord::chained(vote, chain.records.last());
        chain.voters.insert(record.voter_hash.clone(), chain.records.len());
        chain.records.push(record.clone());
        Ok(record)
    }

    async fn record_for_voter(
        &self,
        election_id: ElectionId,
        voter_hash: &str,
    ) -> Result<Option<VoteRecord>, StoreError> {
        let chains = self.chains.lock().await;
        Ok(chains.get(&election_id).and_then(|chain| {
            chain
                .voters
                .get(voter_hash)
                .map(|&index| chain.records[index].clone())
        }))
    }

    async fn records(&self, election_id: ElectionId) -> Result<Vec<VoteRecord>, StoreError> {
        let chains = self.chains.lock().await;
        Ok(chains
            .get(&election_id)
            .map(|chain| chain.records.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
impl MemoryLedgerStore {
    /// Mutate a stored record out of band, bypassing the append path.
    pub(crate) async fn tamper(
        &self,
        election_id: ElectionId,
        block_index: usize,
        mutate: impl FnOnce(&mut VoteRecord),
    ) {
        let mut chains = self.chains.lock().await;
        let record = chains
            .get_mut(&election_id)
            .unwrap()
            .records
            .get_mut(block_index)
            .unwrap();
        mutate(record);
    }
}
