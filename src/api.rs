use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use log::{debug, error, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::biometric::{BiometricGate, BiometricSample, VerificationOutcome};
use crate::clock::Clock;
use crate::config::Config;
use crate::eligibility::{Eligibility, EligibilityResolver};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::model::candidate::Candidate;
use crate::model::election::{Election, ElectionPhase, ElectionScope, ElectionStatus, ElectionStore};
use crate::model::vote::{LedgerDump, Receipt};
use crate::model::voter::{voter_hash, RegistrationStore};
use crate::model::{CandidateId, ElectionId};
use crate::registry::CitizenRegistry;
use crate::session::{BiometricStep, SessionState, VotingSession};

/// Non-authoritative convenience view of the ledger for one voter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub has_voted: bool,
}

/// The end-to-end vote-casting orchestrator.
///
/// Composes the clock, the eligibility resolver, the biometric gate and
/// the ledger into the casting protocol. One logical session per voting
/// attempt; sessions for different voters run fully in parallel, and the
/// exactly-once guarantee lives in the ledger store, not here — this
/// service may be one of many stateless replicas.
pub struct VotingService {
    config: Config,
    elections: Arc<dyn ElectionStore>,
    registrations: Arc<dyn RegistrationStore>,
    resolver: EligibilityResolver,
    gate: Arc<dyn BiometricGate>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, VotingSession>>,
}

impl VotingService {
    pub fn new(
        config: Config,
        registry: Arc<dyn CitizenRegistry>,
        registrations: Arc<dyn RegistrationStore>,
        elections: Arc<dyn ElectionStore>,
        gate: Arc<dyn BiometricGate>,
        ledger: Ledger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = EligibilityResolver::new(registry, registrations.clone());
        Self {
            config,
            elections,
            registrations,
            resolver,
            gate,
            ledger,
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve eligibility for one voter and election. Always resolved
    /// fresh, always server-side.
    pub async fn check_eligibility(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<Eligibility> {
        let election = self.election(election_id).await?;
        self.resolver.resolve_for_election(voter_id, &election).await
    }

    /// Has this voter's hash been recorded for the election? Convenience
    /// read; the append itself remains the authority.
    pub async fn check_vote_status(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<VoteStatus> {
        let hash = voter_hash(voter_id, election_id, &self.config);
        Ok(VoteStatus {
            has_voted: self.ledger.has_voted(election_id, &hash).await?,
        })
    }

    /// The candidates this voter may choose between. Scope filtering is
    /// enforced here, never by hiding options in a UI.
    pub async fn ballot(&self, voter_id: &str, election_id: ElectionId) -> Result<Vec<Candidate>> {
        let election = self.election(election_id).await?;
        let constituency = match self
            .resolver
            .resolve_for_election(voter_id, &election)
            .await?
        {
            Eligibility::Eligible { constituency, .. } => constituency,
            Eligibility::Ineligible { reason } => return Err(Error::Ineligible(reason)),
        };
        let candidates = self.elections.candidates(election_id).await?;
        Ok(match &election.scope {
            ElectionScope::Constituency { .. } => candidates
                .into_iter()
                .filter(|candidate| candidate.constituency == constituency)
                .collect(),
            _ => candidates,
        })
    }

    /// Open a voting session: eligibility gate, phase gate, duplicate
    /// pre-check, then arm the biometric gate.
    pub async fn begin_session(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<String> {
        let election = self.active_election(election_id).await?;
        let now = self.clock.now();

        let eligibility = self
            .resolver
            .resolve_for_election(voter_id, &election)
            .await?;
        let (state, scope) = SessionState::Start.on_eligibility(eligibility)?;
        let state = state.on_phase_check(election.phase(now))?;

        let hash = voter_hash(voter_id, election_id, &self.config);
        let state = state.on_ledger_precheck(self.ledger.has_voted(election_id, &hash).await?)?;
        let state = state.on_gate_armed()?;

        let id = new_session_id();
        let session = VotingSession {
            id: id.clone(),
            voter_id: voter_id.to_string(),
            election_id,
            scope,
            created_at: now,
            state,
        };
        self.sessions.lock().await.insert(id.clone(), session);
        info!("session {id} opened for election {election_id}");
        Ok(id)
    }

    /// Run the biometric gate for a pending session.
    ///
    /// Attempts are bounded; exhausting them discards the session, forcing
    /// identity re-verification through a fresh `begin_session`. The gate
    /// call runs under the configured timeout, and a timed-out capture
    /// counts as a failed attempt rather than hanging the session.
    pub async fn submit_biometric(
        &self,
        session_id: &str,
        live_sample: &BiometricSample,
    ) -> Result<VerificationOutcome> {
        let now = self.clock.now();
        // Snapshot what the capture needs, then release the session map.
        let (voter_id, state) = {
            let mut sessions = self.sessions.lock().await;
            let session =
                Self::live_session(&mut sessions, session_id, now, &self.config)?;
            (session.voter_id.clone(), session.state.clone())
        };
        if !matches!(state, SessionState::BiometricPending { .. }) {
            return Err(state.unexpected("biometric submission"));
        }

        let registration = self
            .registrations
            .registration(&voter_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No registration for voter {voter_id:?}")))?;

        let outcome = match timeout(
            self.config.biometric_timeout(),
            self.gate.verify(live_sample, &registration.biometric_reference),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("session {session_id}: biometric verification timed out");
                VerificationOutcome {
                    passed: false,
                    confidence: 0,
                }
            }
        };

        // Feed the outcome through the state machine. The session may have
        // been cancelled while the gate ran; that is a clean miss.
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("No session found with ID {session_id:?}")))?;
        let (next, step) = session.state.clone().on_biometric(outcome.passed)?;
        session.state = next;
        match step {
            BiometricStep::Verified => {
                debug!(
                    "session {session_id}: biometric verified (confidence {})",
                    outcome.confidence
                );
                Ok(outcome)
            }
            BiometricStep::Retry { attempts_remaining } => {
                Err(Error::BiometricFailed { attempts_remaining })
            }
            BiometricStep::Exhausted => {
                sessions.remove(session_id);
                warn!("session {session_id}: biometric attempts exhausted, session discarded");
                Err(Error::BiometricFailed {
                    attempts_remaining: 0,
                })
            }
        }
    }

    /// Cast the vote for a biometric-verified session.
    ///
    /// The phase is re-validated immediately before the ledger write; the
    /// append itself is the point of no return and the sole authority on
    /// duplicates.
    pub async fn cast_vote(
        &self,
        session_id: &str,
        election_id: ElectionId,
        candidate_id: &str,
    ) -> Result<Receipt> {
        let now = self.clock.now();
        let election = self.active_election(election_id).await?;

        let (voter_id, scope, state) = {
            let mut sessions = self.sessions.lock().await;
            let session =
                Self::live_session(&mut sessions, session_id, now, &self.config)?;
            if session.election_id != election_id {
                return Err(Error::BadRequest(format!(
                    "Session {session_id:?} is not for election {election_id}"
                )));
            }
            (
                session.voter_id.clone(),
                session.scope.clone(),
                session.state.clone(),
            )
        };

        // Validate the candidate against the scope snapshotted at
        // eligibility time, never against a fresh derivation.
        let candidate = self
            .elections
            .candidates(election_id)
            .await?
            .into_iter()
            .find(|candidate| candidate.id == candidate_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Candidate {candidate_id:?} not found in election {election_id}"
                ))
            })?;
        if matches!(election.scope, ElectionScope::Constituency { .. })
            && candidate.constituency != scope.constituency
        {
            return Err(Error::BadRequest(format!(
                "Candidate {candidate_id:?} is not on this voter's ballot"
            )));
        }

        // Second phase gate: the window may have closed during a long
        // biometric pause.
        let state = state.on_final_phase_check(election.phase(now))?;

        let hash = voter_hash(&voter_id, election_id, &self.config);
        let record = match self
            .ledger
            .append(election_id, hash, candidate.id.clone(), now)
            .await
        {
            Ok(record) => record,
            Err(Error::AlreadyVoted) => {
                // Lost a race after the pre-check: surface the true cause.
                self.sessions.lock().await.remove(session_id);
                return Err(Error::AlreadyVoted);
            }
            // A store outage stays retryable; callers must re-query the
            // ledger before retrying, and the uniqueness constraint makes
            // even a blind retry safe.
            Err(err) => return Err(err),
        };
        let state = state.on_appended()?;

        // Receipt construction cannot fail once the record exists.
        let receipt = Receipt::from_record(&record, candidate.name.clone(), &self.config);
        let _ = state.on_receipted()?;
        // No vote data outlives the session.
        self.sessions.lock().await.remove(session_id);
        info!(
            "election {election_id}: vote recorded at block {}",
            record.block_index
        );
        Ok(receipt)
    }

    /// Election results. Served only once the results time has passed, and
    /// never from a chain that fails verification.
    pub async fn get_results(
        &self,
        election_id: ElectionId,
    ) -> Result<HashMap<CandidateId, u64>> {
        let election = self.election(election_id).await?;
        let phase = election.phase(self.clock.now());
        if phase != ElectionPhase::ResultsAvailable {
            return Err(Error::ResultsNotAvailable(phase));
        }
        if let Err(err) = self.ledger.verify_chain(election_id).await {
            // Operational alert; the voter-facing call only learns that
            // publication is halted.
            error!("election {election_id}: results publication halted: {err}");
            return Err(err);
        }
        self.ledger.tally(election_id, None).await
    }

    /// Abandon an in-flight session. Valid any time before the ledger
    /// write; after it there is no undo path.
    pub async fn cancel_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(session_id).map(|session| &session.state) {
            Some(SessionState::Voted) | Some(SessionState::Receipted) => Err(Error::BadRequest(
                "Vote already recorded; cancellation is no longer possible".to_string(),
            )),
            Some(_) => {
                sessions.remove(session_id);
                debug!("session {session_id} cancelled");
                Ok(())
            }
            None => Err(Error::NotFound(format!(
                "No session found with ID {session_id:?}"
            ))),
        }
    }

    /// Re-verify an election's chain. Audit surface, not the hot path.
    pub async fn audit_chain(&self, election_id: ElectionId) -> Result<()> {
        self.ledger.verify_chain(election_id).await
    }

    /// Export an election's chain for offline verification.
    pub async fn export_ledger(&self, election_id: ElectionId) -> Result<LedgerDump> {
        self.ledger.export(election_id).await
    }

    async fn election(&self, election_id: ElectionId) -> Result<Election> {
        self.elections
            .election(election_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No election found with ID {election_id}")))
    }

    /// Like `election`, but additionally requires the election to accept
    /// votes at all.
    async fn active_election(&self, election_id: ElectionId) -> Result<Election> {
        let election = self.election(election_id).await?;
        if election.status != ElectionStatus::Active {
            return Err(Error::BadRequest(format!(
                "Election {election_id} is not active"
            )));
        }
        Ok(election)
    }

    /// Fetch a session, reaping it first if the TTL has passed.
    fn live_session<'a>(
        sessions: &'a mut HashMap<String, VotingSession>,
        session_id: &str,
        now: DateTime<Utc>,
        config: &Config,
    ) -> Result<&'a mut VotingSession> {
        let expired = sessions
            .get(session_id)
            .map_or(false, |session| session.expired(now, config.session_ttl()));
        if expired {
            debug!("session {session_id} expired");
            sessions.remove(session_id);
        }
        sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("No session found with ID {session_id:?}")))
    }
}

fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    HEXLOWER.encode(&bytes)
}
