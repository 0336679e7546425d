//! Remote confirmation of a credential with bounded retry.

use crate::identity_client::{IdentityError, IdentityService};
use crate::{Credential, Profile};
use console_config_and_utils::AuthTuning;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a credential could not be confirmed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The identity service refused the credential. Never retried.
    #[error("credential rejected: {0}")]
    Rejected(String),

    /// Every attempt failed with a retryable error.
    #[error("verification gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Retry budget for verification.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    pub max_delay_ms: u64,
    /// Deadline for a single attempt in milliseconds.
    pub attempt_timeout_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 120,
            max_delay_ms: 1000,
            attempt_timeout_ms: 5000,
        }
    }
}

impl From<&AuthTuning> for VerifyConfig {
    fn from(tuning: &AuthTuning) -> Self {
        Self {
            max_attempts: tuning.verify_max_attempts,
            initial_delay_ms: tuning.verify_initial_delay_ms,
            max_delay_ms: tuning.verify_max_delay_ms,
            attempt_timeout_ms: tuning.verify_attempt_timeout_ms,
        }
    }
}

impl VerifyConfig {
    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Confirms credentials against `GET /me`.
#[derive(Clone)]
pub struct SessionVerifier {
    identity: Arc<dyn IdentityService>,
    config: VerifyConfig,
}

impl SessionVerifier {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self::with_config(identity, VerifyConfig::default())
    }

    pub fn with_config(identity: Arc<dyn IdentityService>, config: VerifyConfig) -> Self {
        Self { identity, config }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Fetch the profile for `credential`, retrying transient failures.
    ///
    /// A rejection short-circuits the loop. Each attempt is bounded by
    /// `attempt_timeout_ms`, so the whole call is bounded too.
    pub async fn verify(&self, credential: &Credential) -> Result<Profile, VerificationFailure> {
        let attempts = self.config.attempts();
        let deadline = Duration::from_millis(self.config.attempt_timeout_ms);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let outcome = tokio::time::timeout(deadline, self.identity.fetch_profile(credential))
                .await
                .unwrap_or(Err(IdentityError::Timeout));

            match outcome {
                Ok(profile) => {
                    debug!(attempt = attempt + 1, user_id = %profile.id, "Credential verified");
                    return Ok(profile);
                }
                Err(e) if e.is_rejection() => {
                    debug!(attempt = attempt + 1, "Credential rejected by identity service");
                    return Err(VerificationFailure::Rejected(e.detail()));
                }
                Err(e) => {
                    debug!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "Verification attempt failed"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.config.delay_for_attempt(attempt)).await;
            }
        }

        warn!(attempts, last_error = %last_error, "Verification retries exhausted");
        Err(VerificationFailure::Exhausted {
            attempts,
            last_error,
        })
    }
}
