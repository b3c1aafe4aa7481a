pub mod candidate;
pub mod election;
pub mod vote;
pub mod voter;

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our candidate IDs are strings.
pub type CandidateId = String;
/// Voter IDs are opaque identity tokens issued at registration.
pub type VoterId = String;
/// A voter's per-election one-way identifier (hex HMAC output).
pub type VoterHash = String;
