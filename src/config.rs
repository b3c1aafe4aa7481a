use chrono::Duration;
use serde::Deserialize;

/// Application configuration. The embedding application deserializes this
/// from whatever configuration source it uses (config file, environment)
/// and hands it to [`crate::VotingService`].
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    biometric_timeout: u32,
    session_ttl: u32,
    // secrets
    hmac_secret: String,
}

impl Config {
    /// Server-side bound on a single biometric gate call, in seconds.
    pub fn biometric_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.biometric_timeout.into())
    }

    /// Valid lifetime of a voting session in seconds.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// Secret key used to derive voter hashes and receipt confirmation codes.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}
