use serde::{Deserialize, Serialize};

use super::{CandidateId, ElectionId};

/// A candidate standing in a specific election and constituency.
/// Read-only to the voting core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub election_id: ElectionId,
    pub constituency: String,
    pub name: String,
    pub party: String,
}
