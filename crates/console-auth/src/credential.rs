//! Bearer credentials and local claim inspection.
//!
//! Local inspection only ever proves expiry. Anything that cannot be decoded
//! is *structurally indeterminate* and left for the identity service to judge.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Default tolerance applied to the `exp` claim.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 5;

/// Opaque bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Decode the claims segment.
    pub fn claims(&self) -> Result<Claims, ClaimsError> {
        Claims::decode(&self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(len={})", self.0.len())
    }
}

/// Why a credential could not be decoded locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("credential has {0} segment(s), expected at least 3")]
    TooFewSegments(usize),

    #[error("claims segment is not valid base64url: {0}")]
    Encoding(String),

    #[error("claims segment is not a JSON object: {0}")]
    Payload(String),
}

/// Claims decoded from the credential payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl Claims {
    fn decode(token: &str) -> Result<Self, ClaimsError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() < 3 {
            return Err(ClaimsError::TooFewSegments(segments.len()));
        }

        // Tolerate padded encoders.
        let payload = segments[1].trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| ClaimsError::Encoding(e.to_string()))?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Payload(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ClaimsError::Payload("payload is not an object".to_string()))?;

        Ok(Self {
            subject: object.get("sub").and_then(subject_string),
            expires_at: object.get("exp").and_then(numeric_instant),
            issued_at: object.get("iat").and_then(numeric_instant),
        })
    }
}

fn subject_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// NumericDate (seconds since epoch, possibly fractional).
fn numeric_instant(value: &Value) -> Option<DateTime<Utc>> {
    let seconds = value.as_f64()?;
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Stateless local expiry check.
#[derive(Debug, Clone, Copy)]
pub struct TokenValidator {
    skew: Duration,
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::with_skew_secs(DEFAULT_CLOCK_SKEW_SECS)
    }
}

impl TokenValidator {
    /// Negative values count as zero; values beyond `Duration`'s range
    /// saturate, which means no token is ever considered expired.
    pub fn with_skew_secs(secs: i64) -> Self {
        Self {
            skew: Duration::try_seconds(secs.max(0)).unwrap_or(Duration::MAX),
        }
    }

    /// True only when the credential carries an `exp` claim that lies further
    /// in the past than the skew tolerance.
    pub fn is_definitely_expired(&self, credential: &Credential) -> bool {
        self.is_definitely_expired_at(credential, Utc::now())
    }

    pub fn is_definitely_expired_at(&self, credential: &Credential, now: DateTime<Utc>) -> bool {
        match credential.claims() {
            Ok(Claims {
                expires_at: Some(expires_at),
                ..
            }) => expires_at
                .checked_add_signed(self.skew)
                .is_some_and(|limit| limit < now),
            Ok(_) => false,
            Err(e) => {
                tracing::trace!(reason = %e, "credential is structurally indeterminate");
                false
            }
        }
    }
}
