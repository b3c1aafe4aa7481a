use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

use super::candidate::Candidate;
use super::ElectionId;

/// The geographic breadth an election is restricted to. Scope filters both
/// the candidates on a ballot and the voters allowed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionScope {
    National,
    State { state: String },
    Constituency { state: String, constituency: String },
}

/// States in the Election lifecycle. Transitions are an administrator
/// action; the voting core only reads the current value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionStatus {
    /// Under construction, only visible to admins.
    Draft,
    /// Published and accepting votes inside the voting window.
    Active,
    /// Concluded; kept for results and audit.
    Completed,
}

/// Where an election currently sits relative to its configured window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionPhase {
    Pending,
    Voting,
    Closed,
    ResultsAvailable,
}

impl Display for ElectionPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionPhase::Pending => write!(f, "pending"),
            ElectionPhase::Voting => write!(f, "voting"),
            ElectionPhase::Closed => write!(f, "closed"),
            ElectionPhase::ResultsAvailable => write!(f, "results available"),
        }
    }
}

/// An election's configuration. Created by an administrator action; the
/// voting core treats it as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    pub scope: ElectionScope,
    pub status: ElectionStatus,
    /// Start of the voting window (inclusive).
    pub voting_start: DateTime<FixedOffset>,
    /// End of the voting window (exclusive).
    pub voting_end: DateTime<FixedOffset>,
    /// Instant from which results may be served.
    pub results_time: DateTime<FixedOffset>,
    /// The election's own timezone; all phase comparisons happen in it.
    #[serde(with = "serde_fixed_offset")]
    pub timezone: FixedOffset,
}

impl Election {
    /// Create an election, enforcing `voting_start < voting_end < results_time`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ElectionId,
        title: String,
        scope: ElectionScope,
        status: ElectionStatus,
        voting_start: DateTime<FixedOffset>,
        voting_end: DateTime<FixedOffset>,
        results_time: DateTime<FixedOffset>,
        timezone: FixedOffset,
    ) -> Result<Self> {
        if !(voting_start < voting_end && voting_end < results_time) {
            return Err(Error::BadRequest(format!(
                "Election times must satisfy voting_start < voting_end < results_time, \
got {voting_start} / {voting_end} / {results_time}"
            )));
        }
        Ok(Self {
            id,
            title,
            scope,
            status,
            voting_start,
            voting_end,
            results_time,
            timezone,
        })
    }

    /// The election's phase at the given instant.
    ///
    /// Pure function of the configuration and `now`. The instant is taken
    /// into the election's own timezone before comparison, and boundaries
    /// are half-open: a vote at the exact start instant is accepted, one at
    /// the exact end instant is rejected.
    pub fn phase(&self, now: DateTime<Utc>) -> ElectionPhase {
        let now = now.with_timezone(&self.timezone);
        if now < self.voting_start {
            ElectionPhase::Pending
        } else if now < self.voting_end {
            ElectionPhase::Voting
        } else if now < self.results_time {
            ElectionPhase::Closed
        } else {
            ElectionPhase::ResultsAvailable
        }
    }
}

/// Serde helper for `FixedOffset`, stored as `"+05:30"`-style strings.
pub mod serde_fixed_offset {
    use chrono::FixedOffset;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(offset: &FixedOffset, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&offset.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FixedOffset, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Read access to election configuration and candidate lists.
#[async_trait]
pub trait ElectionStore: Send + Sync {
    /// Look up an election by ID.
    async fn election(&self, id: ElectionId) -> Result<Option<Election>>;

    /// All candidates standing in the given election.
    async fn candidates(&self, election_id: ElectionId) -> Result<Vec<Candidate>>;
}

#[derive(Debug, Default)]
struct Directory {
    elections: HashMap<ElectionId, Election>,
    candidates: Vec<Candidate>,
}

/// In-memory election directory, used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryElectionStore {
    inner: Mutex<Directory>,
}

impl MemoryElectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_election(&self, election: Election) {
        self.inner.lock().await.elections.insert(election.id, election);
    }

    pub async fn insert_candidates(&self, candidates: impl IntoIterator<Item = Candidate> + Send) {
        self.inner.lock().await.candidates.extend(candidates);
    }
}

#[async_trait]
impl ElectionStore for MemoryElectionStore {
    async fn election(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.inner.lock().await.elections.get(&id).cloned())
    }

    async fn candidates(&self, election_id: ElectionId) -> Result<Vec<Candidate>> {
        Ok(self
            .inner
            .lock()
            .await
            .candidates
            .iter()
            .filter(|candidate| candidate.election_id == election_id)
            .cloned()
            .collect())
    }
}
