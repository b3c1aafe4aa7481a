use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Confidence score (0-100) below which verification fails, for every gate
/// implementation. Published and fixed; implementations cannot weaken it.
pub const MATCH_THRESHOLD: u8 = 75;

/// Upper bound on biometric attempts within one voting session.
pub const MAX_BIOMETRIC_ATTEMPTS: u8 = 3;

/// An opaque captured biometric sample (face capture, fingerprint, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricSample(Vec<u8>);

impl BiometricSample {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The result of one biometric verification call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub passed: bool,
    pub confidence: u8,
}

/// A pluggable matching capability, stateless per call.
///
/// Implementations supply only the raw confidence score; the pass/fail
/// decision lives in the provided `verify` so that no implementation can
/// weaken the threshold or pass an absent sample. Cancel-safe: dropping the
/// returned future has no effect on any other component.
#[async_trait]
pub trait BiometricGate: Send + Sync {
    /// Raw similarity between the samples, scored 0-100.
    async fn match_confidence(
        &self,
        live: &BiometricSample,
        reference: &BiometricSample,
    ) -> Result<u8>;

    /// Full verification: absent samples never pass, and
    /// [`MATCH_THRESHOLD`] decides the outcome.
    async fn verify(
        &self,
        live: &BiometricSample,
        reference: &BiometricSample,
    ) -> Result<VerificationOutcome> {
        if live.is_empty() || reference.is_empty() {
            return Ok(VerificationOutcome {
                passed: false,
                confidence: 0,
            });
        }
        let confidence = self.match_confidence(live, reference).await?.min(100);
        Ok(VerificationOutcome {
            passed: confidence >= MATCH_THRESHOLD,
            confidence,
        })
    }
}

/// Naive byte-similarity stand-in for a real matcher.
///
/// Deliberately simple: orchestration logic must be testable independently
/// of matching quality. Repeated captures of the same subject vary, so a
/// small calibrated jitter is applied to the score.
#[derive(Debug, Default)]
pub struct SimilarityGate;

#[async_trait]
impl BiometricGate for SimilarityGate {
    async fn match_confidence(
        &self,
        live: &BiometricSample,
        reference: &BiometricSample,
    ) -> Result<u8> {
        let len = live.as_bytes().len().max(reference.as_bytes().len());
        if len == 0 {
            return Ok(0);
        }
        let matching = live
            .as_bytes()
            .iter()
            .zip(reference.as_bytes())
            .filter(|(a, b)| a == b)
            .count();
        let score = (matching * 100 / len) as i16;
        let jitter = rand::thread_rng().gen_range(-3i16..=3);
        Ok((score + jitter).clamp(0, 100) as u8)
    }
}
