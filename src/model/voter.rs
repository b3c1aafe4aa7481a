use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::Mutex;

use crate::biometric::BiometricSample;
use crate::config::Config;
use crate::error::{Error, Result};

use super::{ElectionId, VoterHash, VoterId};

pub type HmacSha256 = Hmac<Sha256>;

/// Whether a registration is usable for voting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Active,
    Revoked,
}

/// A voter's registration record. Created once by the registration step;
/// immutable afterwards except for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub voter_id: VoterId,
    pub aadhar_number: String,
    pub date_of_birth: NaiveDate,
    pub constituency: String,
    pub state: String,
    pub registered_at: DateTime<Utc>,
    pub status: RegistrationStatus,
    /// Reference sample captured at registration, compared against live
    /// captures by the biometric gate.
    pub biometric_reference: BiometricSample,
}

/// Derive the per-election ledger identifier for a voter.
///
/// One-way: vote data alone cannot be mapped back to an identity, but the
/// same voter always produces the same hash for a given election, which is
/// what makes duplicate detection possible.
pub fn voter_hash(voter_id: &str, election_id: ElectionId, config: &Config) -> VoterHash {
    // Do not directly store potentially sensitive identity data.
    let mut hmac = HmacSha256::new_from_slice(config.hmac_secret())
        .expect("HMAC can take key of any size");
    hmac.update(voter_id.as_bytes());
    hmac.update(&election_id.to_le_bytes());
    HEXLOWER.encode(hmac.finalize().into_bytes().as_slice())
}

/// Storage for voter registrations. Registration writes happen in the
/// external registration step; the voting core only reads.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Look up a voter's registration, if any.
    async fn registration(&self, voter_id: &str) -> Result<Option<Registration>>;

    /// Create a registration. Re-registration of the same voter is rejected.
    async fn register(&self, registration: Registration) -> Result<()>;
}

/// In-memory registration store, used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    registrations: Mutex<HashMap<VoterId, Registration>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn registration(&self, voter_id: &str) -> Result<Option<Registration>> {
        Ok(self.registrations.lock().await.get(voter_id).cloned())
    }

    async fn register(&self, registration: Registration) -> Result<()> {
        let mut registrations = self.registrations.lock().await;
        if registrations.contains_key(&registration.voter_id) {
            return Err(Error::BadRequest(format!(
                "Voter {:?} is already registered",
                registration.voter_id
            )));
        }
        registrations.insert(registration.voter_id.clone(), registration);
        Ok(())
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::TimeZone;

    use super::*;

    impl Registration {
        pub fn example() -> Self {
            Self {
                voter_id: "VOTER-0001".to_string(),
                aadhar_number: "1234-5678-9012".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
                constituency: "Coimbatore".to_string(),
                state: "Tamil Nadu".to_string(),
                registered_at: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
                status: RegistrationStatus::Active,
                biometric_reference: BiometricSample::new(vec![7u8; 64]),
            }
        }
    }
}
