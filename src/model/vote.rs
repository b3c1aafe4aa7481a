use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use hmac::Mac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Config;

use super::voter::HmacSha256;
use super::{CandidateId, ElectionId, VoterHash};

/// `prev_hash` of the first record in every election's chain.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// A single entry in an election's append-only vote chain.
///
/// Created exactly once per `(election_id, voter_hash)` pair by the ledger;
/// immutable thereafter, never deleted or updated. The chain is
/// per-election, not global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub election_id: ElectionId,
    pub voter_hash: VoterHash,
    pub candidate_id: CandidateId,
    pub vote_hash: String,
    pub prev_hash: String,
    pub block_index: u64,
    pub timestamp: DateTime<Utc>,
}

/// The inputs to a chain extension, before linkage is known.
#[derive(Debug, Clone)]
pub struct NewVote {
    pub election_id: ElectionId,
    pub voter_hash: VoterHash,
    pub candidate_id: CandidateId,
    pub timestamp: DateTime<Utc>,
}

impl VoteRecord {
    /// Extend the chain whose current tip is `tip` with a new vote.
    ///
    /// Must run inside the store's critical section: the tip read and the
    /// insert of the returned record cannot be allowed to interleave with
    /// another append for the same election.
    pub fn chained(vote: NewVote, tip: Option<&VoteRecord>) -> Self {
        let (prev_hash, block_index) = match tip {
            Some(tip) => (tip.vote_hash.clone(), tip.block_index + 1),
            None => (GENESIS_PREV_HASH.to_string(), 0),
        };
        let vote_hash = vote_hash(
            &vote.voter_hash,
            &vote.candidate_id,
            vote.timestamp,
            &prev_hash,
        );
        Self {
            election_id: vote.election_id,
            voter_hash: vote.voter_hash,
            candidate_id: vote.candidate_id,
            vote_hash,
            prev_hash,
            block_index,
            timestamp: vote.timestamp,
        }
    }

    /// Recompute this record's hash from its stored fields.
    pub fn recompute_hash(&self) -> String {
        vote_hash(
            &self.voter_hash,
            &self.candidate_id,
            self.timestamp,
            &self.prev_hash,
        )
    }
}

/// Hash binding a vote to its chain position. Any retroactive edit to an
/// earlier record changes every subsequent hash in the chain.
fn vote_hash(
    voter_hash: &str,
    candidate_id: &str,
    timestamp: DateTime<Utc>,
    prev_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(voter_hash.as_bytes());
    hasher.update(candidate_id.as_bytes());
    hasher.update(timestamp.timestamp_millis().to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    HEXLOWER.encode(hasher.finalize().as_slice())
}

/// Ways a stored chain can fail verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("record {block_index} does not hash to its stored vote_hash")]
    WrongHash { block_index: u64 },
    #[error("record {block_index} does not link to the previous record")]
    BrokenLink { block_index: u64 },
    #[error("expected block index {expected}, found {found}")]
    WrongIndex { expected: u64, found: u64 },
    #[error("record {block_index} belongs to a different election")]
    WrongElection { block_index: u64 },
    #[error("record {block_index} repeats an earlier voter hash")]
    DuplicateVoter { block_index: u64 },
}

/// Recompute every hash in one election's chain and confirm linkage, index
/// contiguity and per-chain voter uniqueness. Records must be supplied in
/// block-index order, as the store returns them.
pub fn check_chain(election_id: ElectionId, records: &[VoteRecord]) -> Result<(), ChainFault> {
    let mut prev_hash = GENESIS_PREV_HASH;
    let mut seen = HashSet::new();
    for (i, record) in records.iter().enumerate() {
        let expected = i as u64;
        if record.block_index != expected {
            return Err(ChainFault::WrongIndex {
                expected,
                found: record.block_index,
            });
        }
        if record.election_id != election_id {
            return Err(ChainFault::WrongElection {
                block_index: expected,
            });
        }
        if record.prev_hash != prev_hash {
            return Err(ChainFault::BrokenLink {
                block_index: expected,
            });
        }
        if record.recompute_hash() != record.vote_hash {
            return Err(ChainFault::WrongHash {
                block_index: expected,
            });
        }
        if !seen.insert(record.voter_hash.as_str()) {
            return Err(ChainFault::DuplicateVoter {
                block_index: expected,
            });
        }
        prev_hash = &record.vote_hash;
    }
    Ok(())
}

/// Voter-facing confirmation of a recorded vote. Derived from the ledger
/// record; the record stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub vote_id: String,
    pub transaction_hash: String,
    pub vote_hash: String,
    pub timestamp: DateTime<Utc>,
    pub candidate_name: String,
}

impl Receipt {
    /// Construct a receipt for the given record.
    pub fn from_record(record: &VoteRecord, candidate_name: String, config: &Config) -> Self {
        // The confirmation code binds the receipt to the stored record
        // under the server key; it cannot be produced without it.
        let mut hmac = HmacSha256::new_from_slice(config.hmac_secret())
            .expect("HMAC can take key of any size");
        hmac.update(record.vote_hash.as_bytes());
        hmac.update(&record.block_index.to_le_bytes());
        let transaction_hash = HEXLOWER.encode(hmac.finalize().into_bytes().as_slice());

        Self {
            vote_id: format!("{}-{}", record.election_id, record.block_index),
            transaction_hash,
            vote_hash: record.vote_hash.clone(),
            timestamp: record.timestamp,
            candidate_name,
        }
    }
}

/// One election's full chain, exported for offline audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDump {
    pub election_id: ElectionId,
    pub records: Vec<VoteRecord>,
}

impl LedgerDump {
    /// Verify the dumped chain.
    pub fn verify(&self) -> Result<(), ChainFault> {
        check_chain(self.election_id, &self.records)
    }

    /// Per-candidate counts over the dumped records.
    pub fn tally(&self) -> HashMap<CandidateId, u64> {
        let mut counts = HashMap::new();
        for record in &self.records {
            *counts.entry(record.candidate_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}
