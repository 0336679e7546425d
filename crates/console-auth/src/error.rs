//! Session manager error types.

use crate::identity_client::IdentityError;
use crate::verifier::VerificationFailure;
use thiserror::Error;

/// Error returned by the operations that propagate failures to the caller.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login refused or could not be completed; carries the message shown
    /// next to the login form.
    #[error("{0}")]
    LoginFailed(String),

    /// Operation needs an authenticated session
    #[error("Not logged in")]
    NotLoggedIn,

    /// The identity service no longer accepts the current credential
    #[error("Session ended: {0}")]
    SessionEnded(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] console_storage::StorageError),

    /// Identity service error
    #[error("Identity service error: {0}")]
    Identity(#[from] IdentityError),

    /// Verification of a fresh credential failed
    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationFailure),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] console_config_and_utils::CoreError),

    /// Invalid state transition in the lifecycle FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),
}

impl AuthError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Identity(e) => e.is_transient(),
            AuthError::Verification(VerificationFailure::Exhausted { .. }) => true,
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_failed_displays_detail_verbatim() {
        let error = AuthError::LoginFailed("invalid credentials".to_string());
        assert_eq!(error.to_string(), "invalid credentials");
        assert!(!error.is_transient());
    }

    #[test]
    fn test_is_transient_identity_timeout() {
        assert!(AuthError::Identity(IdentityError::Timeout).is_transient());
    }

    #[test]
    fn test_is_not_transient_rejection() {
        let error = AuthError::Identity(IdentityError::Unauthorized {
            detail: "revoked".to_string(),
        });
        assert!(!error.is_transient());
        assert!(!AuthError::NotLoggedIn.is_transient());
    }

    #[test]
    fn test_is_transient_exhausted_verification() {
        let error = AuthError::from(VerificationFailure::Exhausted {
            attempts: 3,
            last_error: "HTTP 503: Service Unavailable".to_string(),
        });
        assert!(error.is_transient());
        assert!(!AuthError::from(VerificationFailure::Rejected("revoked".to_string())).is_transient());
    }
}
