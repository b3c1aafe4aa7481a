use std::fmt::{Display, Formatter};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::election::{Election, ElectionScope};
use crate::model::voter::{RegistrationStatus, RegistrationStore};
use crate::registry::CitizenRegistry;

/// Why a voter cannot vote.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IneligibilityReason {
    NotRegistered,
    RegistrationRevoked,
    /// The registry cross-check of the registered identity failed.
    IdentityNotVerified,
    /// Registered, but outside the election's scope.
    OutOfScope,
}

impl Display for IneligibilityReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IneligibilityReason::NotRegistered => write!(f, "not registered"),
            IneligibilityReason::RegistrationRevoked => write!(f, "registration revoked"),
            IneligibilityReason::IdentityNotVerified => write!(f, "identity not verified"),
            IneligibilityReason::OutOfScope => write!(f, "out of scope"),
        }
    }
}

/// The voter's resolved scope, snapshotted at eligibility-check time.
/// Everything downstream (ballot filtering, candidate validation) reads
/// this snapshot, never a re-derived value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterScope {
    pub constituency: String,
    pub state: String,
}

/// The resolver's verdict for one voting attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eligibility {
    Eligible { constituency: String, state: String },
    Ineligible { reason: IneligibilityReason },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }

    fn ineligible(reason: IneligibilityReason) -> Self {
        Eligibility::Ineligible { reason }
    }
}

/// Resolves a voter's registration and identity.
///
/// Called fresh on every voting attempt: registration status can change
/// between elections, so nothing is cached here.
pub struct EligibilityResolver {
    registry: Arc<dyn CitizenRegistry>,
    registrations: Arc<dyn RegistrationStore>,
}

impl EligibilityResolver {
    pub fn new(
        registry: Arc<dyn CitizenRegistry>,
        registrations: Arc<dyn RegistrationStore>,
    ) -> Self {
        Self {
            registry,
            registrations,
        }
    }

    /// Is this identity registered, live, and verifiable?
    pub async fn resolve(&self, voter_id: &str) -> Result<Eligibility> {
        let Some(registration) = self.registrations.registration(voter_id).await? else {
            return Ok(Eligibility::ineligible(IneligibilityReason::NotRegistered));
        };
        if registration.status == RegistrationStatus::Revoked {
            return Ok(Eligibility::ineligible(
                IneligibilityReason::RegistrationRevoked,
            ));
        }
        // Cross-check the registered identity against the registry.
        let citizen = self
            .registry
            .lookup_by_identity(&registration.aadhar_number, registration.date_of_birth)
            .await?;
        if citizen.is_none() {
            debug!("voter {voter_id}: registry cross-check failed");
            return Ok(Eligibility::ineligible(
                IneligibilityReason::IdentityNotVerified,
            ));
        }
        Ok(Eligibility::Eligible {
            constituency: registration.constituency,
            state: registration.state,
        })
    }

    /// Resolve for a specific election, adding the scope match: for a
    /// constituency election the voter's constituency must equal the
    /// election's; for a state election the state must match; national
    /// elections accept every registered voter.
    pub async fn resolve_for_election(
        &self,
        voter_id: &str,
        election: &Election,
    ) -> Result<Eligibility> {
        let eligibility = self.resolve(voter_id).await?;
        let Eligibility::Eligible {
            constituency,
            state,
        } = &eligibility
        else {
            return Ok(eligibility);
        };
        let in_scope = match &election.scope {
            ElectionScope::National => true,
            ElectionScope::State { state: scope_state } => state == scope_state,
            ElectionScope::Constituency {
                constituency: scope_constituency,
                ..
            } => constituency == scope_constituency,
        };
        if in_scope {
            Ok(eligibility)
        } else {
            Ok(Eligibility::ineligible(IneligibilityReason::OutOfScope))
        }
    }
}
