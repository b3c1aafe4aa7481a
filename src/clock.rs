use chrono::{DateTime, Utc};

/// Source of the server-trusted current instant.
///
/// Every phase decision goes through this; a client-submitted timestamp may
/// be recorded for audit display but must never reach a phase comparison.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
