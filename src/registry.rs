use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;

/// A citizen record as returned by the external registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitizenRecord {
    pub aadhar_number: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
}

/// The external citizen registry.
///
/// The voting core performs a single identity cross-check per eligibility
/// resolution; it never stores or mutates citizen records.
#[async_trait]
pub trait CitizenRegistry: Send + Sync {
    /// Look up a citizen by identity. The registry enforces its own format
    /// and consistency checks; a date-of-birth mismatch is a miss.
    async fn lookup_by_identity(
        &self,
        aadhar_number: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Option<CitizenRecord>>;
}

/// In-memory registry stand-in, used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryCitizenRegistry {
    citizens: Mutex<HashMap<String, CitizenRecord>>,
}

impl MemoryCitizenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: CitizenRecord) {
        self.citizens
            .lock()
            .await
            .insert(record.aadhar_number.clone(), record);
    }
}

#[async_trait]
impl CitizenRegistry for MemoryCitizenRegistry {
    async fn lookup_by_identity(
        &self,
        aadhar_number: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Option<CitizenRecord>> {
        Ok(self
            .citizens
            .lock()
            .await
            .get(aadhar_number)
            .filter(|citizen| citizen.date_of_birth == date_of_birth)
            .cloned())
    }
}
