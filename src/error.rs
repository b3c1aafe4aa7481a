use thiserror::Error;

use crate::eligibility::IneligibilityReason;
use crate::ledger::StoreError;
use crate::model::election::ElectionPhase;
use crate::model::vote::ChainFault;
use crate::model::ElectionId;

pub type Result<T> = std::result::Result<T, Error>;

/// The protocol error taxonomy. Eligibility and phase failures are
/// recovered into caller-facing messages by the orchestrator;
/// [`Error::ChainIntegrityViolation`] never is.
#[derive(Debug, Error)]
pub enum Error {
    /// Not retryable without an external registration change.
    #[error("voter is ineligible: {0}")]
    Ineligible(IneligibilityReason),
    /// Retryable later, not now.
    #[error("voting is not open (election phase is {0})")]
    VotingClosed(ElectionPhase),
    /// Retryable while attempts remain; at zero the session is discarded.
    #[error("biometric verification failed ({attempts_remaining} attempts remaining)")]
    BiometricFailed { attempts_remaining: u8 },
    /// Terminal for the election, never retryable.
    #[error("a vote has already been recorded for this voter in this election")]
    AlreadyVoted,
    #[error("results are not available (election phase is {0})")]
    ResultsNotAvailable(ElectionPhase),
    /// Retryable: the append is idempotent under the ledger's uniqueness
    /// constraint, so re-issuing it can never double-vote.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Fatal. Surfaced to audit and operations; halts result publication
    /// for the affected election.
    #[error("chain integrity violation in election {election_id}: {fault}")]
    ChainIntegrityViolation {
        election_id: ElectionId,
        fault: ChainFault,
    },
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the caller may retry the same operation and hope for a
    /// different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::VotingClosed(_) | Error::BiometricFailed { .. } | Error::StoreUnavailable(_)
        )
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => Error::AlreadyVoted,
            StoreError::Unavailable(msg) => Error::StoreUnavailable(msg),
        }
    }
}
