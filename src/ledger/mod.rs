mod store;

pub use store::{LedgerStore, MemoryLedgerStore, StoreError};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::model::vote::{check_chain, LedgerDump, NewVote, VoteRecord};
use crate::model::{CandidateId, ElectionId, VoterHash};

/// The append-only, tamper-evident vote ledger.
///
/// Exclusively owns `VoteRecord` creation and the chain's `prev_hash`
/// linkage; no other component writes to the store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a vote. Exactly-once per `(election, voter)`: a duplicate
    /// surfaces as [`Error::AlreadyVoted`] no matter how calls race.
    pub async fn append(
        &self,
        election_id: ElectionId,
        voter_hash: VoterHash,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<VoteRecord> {
        let vote = NewVote {
            election_id,
            voter_hash,
            candidate_id,
            timestamp: now,
        };
        match self.store.append(vote).await {
            Ok(record) => {
                debug!(
                    "election {election_id}: appended block {}",
                    record.block_index
                );
                Ok(record)
            }
            Err(StoreError::Duplicate) => Err(Error::AlreadyVoted),
            Err(StoreError::Unavailable(msg)) => {
                warn!("election {election_id}: append failed, store unavailable: {msg}");
                Err(Error::StoreUnavailable(msg))
            }
        }
    }

    /// Non-authoritative convenience read: is this voter hash recorded?
    pub async fn has_voted(&self, election_id: ElectionId, voter_hash: &str) -> Result<bool> {
        Ok(self
            .store
            .record_for_voter(election_id, voter_hash)
            .await?
            .is_some())
    }

    /// Recompute and confirm the whole chain for an election. Audit
    /// surface, not the hot path.
    pub async fn verify_chain(&self, election_id: ElectionId) -> Result<()> {
        let records = self.records(election_id).await?;
        check_chain(election_id, &records)
            .map_err(|fault| Error::ChainIntegrityViolation { election_id, fault })
    }

    /// Count votes per candidate, optionally restricted to a candidate set
    /// (the constituency filter for constituency-scoped elections).
    pub async fn tally(
        &self,
        election_id: ElectionId,
        filter: Option<&HashSet<CandidateId>>,
    ) -> Result<HashMap<CandidateId, u64>> {
        let mut counts = HashMap::new();
        for record in self.records(election_id).await? {
            if filter.map_or(true, |allowed| allowed.contains(&record.candidate_id)) {
                *counts.entry(record.candidate_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Export one election's chain for offline audit.
    pub async fn export(&self, election_id: ElectionId) -> Result<LedgerDump> {
        Ok(LedgerDump {
            election_id,
            records: self.records(election_id).await?,
        })
    }

    async fn records(&self, election_id: ElectionId) -> Result<Vec<VoteRecord>> {
        Ok(self.store.records(election_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::model::vote::{ChainFault, GENESIS_PREV_HASH};

    use super::*;

    fn ledger() -> (Ledger, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        (Ledger::new(store.clone()), store)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 19, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn appends_chain_and_tally() {
        let (ledger, _) = ledger();
        for (voter, candidate) in [("v1", "A"), ("v2", "B"), ("v3", "A"), ("v4", "C")] {
            ledger
                .append(1, voter.to_string(), candidate.to_string(), now())
                .await
                .unwrap();
        }

        let tally = ledger.tally(1, None).await.unwrap();
        assert_eq!(tally.get("A"), Some(&2));
        assert_eq!(tally.get("B"), Some(&1));
        assert_eq!(tally.get("C"), Some(&1));
        assert_eq!(tally.values().sum::<u64>(), 4);

        ledger.verify_chain(1).await.unwrap();

        let dump = ledger.export(1).await.unwrap();
        assert_eq!(dump.records[0].prev_hash, GENESIS_PREV_HASH);
        assert_eq!(dump.records[0].block_index, 0);
        assert_eq!(dump.records[3].block_index, 3);
    }

    #[tokio::test]
    async fn duplicate_voter_is_rejected() {
        let (ledger, _) = ledger();
        ledger
            .append(1, "v1".to_string(), "A".to_string(), now())
            .await
            .unwrap();

        let result = ledger.append(1, "v1".to_string(), "B".to_string(), now()).await;
        assert!(matches!(result, Err(Error::AlreadyVoted)));

        // The first vote stands.
        let tally = ledger.tally(1, None).await.unwrap();
        assert_eq!(tally.get("A"), Some(&1));
        assert_eq!(tally.get("B"), None);
    }

    #[tokio::test]
    async fn chains_are_per_election() {
        let (ledger, _) = ledger();
        ledger
            .append(1, "v1".to_string(), "A".to_string(), now())
            .await
            .unwrap();
        // The same voter hash in another election starts a fresh chain.
        let record = ledger
            .append(2, "v1".to_string(), "A".to_string(), now())
            .await
            .unwrap();
        assert_eq!(record.block_index, 0);
        assert_eq!(record.prev_hash, GENESIS_PREV_HASH);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_for_one_key_succeed_exactly_once() {
        let (ledger, _) = ledger();
        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .append(1, "v1".to_string(), format!("C{}", i % 3), now())
                    .await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::AlreadyVoted) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 15);

        ledger.verify_chain(1).await.unwrap();
        let tally = ledger.tally(1, None).await.unwrap();
        assert_eq!(tally.values().sum::<u64>(), 1);
    }

    #[tokio::test]
    async fn out_of_band_mutation_breaks_verification() {
        let (ledger, store) = ledger();
        for (voter, candidate) in [("v1", "A"), ("v2", "B")] {
            ledger
                .append(1, voter.to_string(), candidate.to_string(), now())
                .await
                .unwrap();
        }
        ledger.verify_chain(1).await.unwrap();

        store
            .tamper(1, 1, |record| record.candidate_id = "A".to_string())
            .await;

        let result = ledger.verify_chain(1).await;
        match result {
            Err(Error::ChainIntegrityViolation {
                election_id: 1,
                fault: ChainFault::WrongHash { block_index: 1 },
            }) => {}
            other => panic!("expected chain violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tally_respects_candidate_filter() {
        let (ledger, _) = ledger();
        for (voter, candidate) in [("v1", "A"), ("v2", "B"), ("v3", "A")] {
            ledger
                .append(1, voter.to_string(), candidate.to_string(), now())
                .await
                .unwrap();
        }

        let filter: HashSet<CandidateId> = ["A".to_string()].into_iter().collect();
        let tally = ledger.tally(1, Some(&filter)).await.unwrap();
        assert_eq!(tally.get("A"), Some(&2));
        assert_eq!(tally.get("B"), None);
    }
}
