use chrono::{DateTime, Duration, Utc};

use crate::biometric::MAX_BIOMETRIC_ATTEMPTS;
use crate::eligibility::{Eligibility, VoterScope};
use crate::error::{Error, Result};
use crate::model::election::ElectionPhase;
use crate::model::{ElectionId, VoterId};

/// Where a voting attempt currently sits in the casting protocol.
///
/// Every transition is a pure function of (current state, input), so the
/// machine is directly unit-testable without the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Start,
    EligibilityChecked,
    ElectionPhaseChecked,
    ElectionSelected,
    BiometricPending { attempts_remaining: u8 },
    BiometricVerified,
    Voted,
    Receipted,
}

/// Result of feeding one biometric outcome into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricStep {
    Verified,
    /// Failed, with retries left.
    Retry { attempts_remaining: u8 },
    /// Failed and out of retries: the attempt restarts from `Start`,
    /// forcing identity re-verification.
    Exhausted,
}

impl SessionState {
    /// `Start → EligibilityChecked`, yielding the scope snapshot; an
    /// ineligible verdict is terminal for this election.
    pub fn on_eligibility(self, eligibility: Eligibility) -> Result<(SessionState, VoterScope)> {
        match self {
            SessionState::Start => match eligibility {
                Eligibility::Eligible {
                    constituency,
                    state,
                } => Ok((
                    SessionState::EligibilityChecked,
                    VoterScope {
                        constituency,
                        state,
                    },
                )),
                Eligibility::Ineligible { reason } => Err(Error::Ineligible(reason)),
            },
            state => Err(state.unexpected("eligibility check")),
        }
    }

    /// `EligibilityChecked → ElectionPhaseChecked` while the election is
    /// inside its voting window.
    pub fn on_phase_check(self, phase: ElectionPhase) -> Result<SessionState> {
        match self {
            SessionState::EligibilityChecked => {
                if phase == ElectionPhase::Voting {
                    Ok(SessionState::ElectionPhaseChecked)
                } else {
                    Err(Error::VotingClosed(phase))
                }
            }
            state => Err(state.unexpected("phase check")),
        }
    }

    /// `ElectionPhaseChecked → ElectionSelected`. Fail-fast pre-check only:
    /// the authoritative duplicate rejection is the ledger's atomic append.
    pub fn on_ledger_precheck(self, has_voted: bool) -> Result<SessionState> {
        match self {
            SessionState::ElectionPhaseChecked => {
                if has_voted {
                    Err(Error::AlreadyVoted)
                } else {
                    Ok(SessionState::ElectionSelected)
                }
            }
            state => Err(state.unexpected("ledger pre-check")),
        }
    }

    /// Arm the biometric gate with the full attempt budget.
    pub fn on_gate_armed(self) -> Result<SessionState> {
        match self {
            SessionState::ElectionSelected => Ok(SessionState::BiometricPending {
                attempts_remaining: MAX_BIOMETRIC_ATTEMPTS,
            }),
            state => Err(state.unexpected("gate arming")),
        }
    }

    /// One biometric outcome. Only valid while the gate is pending.
    pub fn on_biometric(self, passed: bool) -> Result<(SessionState, BiometricStep)> {
        match self {
            SessionState::BiometricPending { attempts_remaining } => {
                if passed {
                    Ok((SessionState::BiometricVerified, BiometricStep::Verified))
                } else if attempts_remaining > 1 {
                    let attempts_remaining = attempts_remaining - 1;
                    Ok((
                        SessionState::BiometricPending { attempts_remaining },
                        BiometricStep::Retry { attempts_remaining },
                    ))
                } else {
                    Ok((SessionState::Start, BiometricStep::Exhausted))
                }
            }
            state => Err(state.unexpected("biometric submission")),
        }
    }

    /// Second phase gate, immediately before the ledger write: a long
    /// biometric pause must not let a vote slip past the close time.
    pub fn on_final_phase_check(self, phase: ElectionPhase) -> Result<SessionState> {
        match self {
            SessionState::BiometricVerified => {
                if phase == ElectionPhase::Voting {
                    Ok(SessionState::BiometricVerified)
                } else {
                    Err(Error::VotingClosed(phase))
                }
            }
            state => Err(state.unexpected("final phase check")),
        }
    }

    /// `BiometricVerified → Voted` once the ledger append has succeeded.
    pub fn on_appended(self) -> Result<SessionState> {
        match self {
            SessionState::BiometricVerified => Ok(SessionState::Voted),
            state => Err(state.unexpected("ledger append")),
        }
    }

    /// `Voted → Receipted`. Cannot fail once `Voted` is reached.
    pub fn on_receipted(self) -> Result<SessionState> {
        match self {
            SessionState::Voted => Ok(SessionState::Receipted),
            state => Err(state.unexpected("receipt construction")),
        }
    }

    pub(crate) fn unexpected(&self, action: &str) -> Error {
        Error::BadRequest(format!("Cannot perform {action} in session state {self:?}"))
    }
}

/// One in-flight voting attempt.
///
/// Holds the scope snapshot taken at eligibility time; after completion the
/// orchestrator drops the session and retains no vote data.
#[derive(Debug, Clone)]
pub struct VotingSession {
    pub id: String,
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    /// Scope snapshot from eligibility resolution.
    pub scope: VoterScope,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
}

impl VotingSession {
    /// Session freshness under the configured TTL.
    pub fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}
