//! Client-side authentication session lifecycle for the dashboard.
//!
//! This crate provides:
//! - Local, side-effect-free credential inspection (claims and expiry)
//! - Server verification of a credential with bounded retry and backoff
//! - Durable credential/profile persistence that never exposes half a pair
//! - An explicit FSM-driven session manager: initialize, login, logout,
//!   refresh and error-clear
//! - An HTTP client for the identity service

mod auth_fsm;
mod credential;
mod error;
mod identity_client;
mod profile;
mod session;
mod store;
mod verifier;

pub use auth_fsm::lifecycle_machine;
pub use auth_fsm::{
    AuthPhase, AuthStateChangedPayload, LifecycleInput, LifecycleMachine, LifecycleState,
};
pub use credential::{Claims, ClaimsError, Credential, TokenValidator, DEFAULT_CLOCK_SKEW_SECS};
pub use error::{AuthError, AuthResult};
pub use identity_client::{
    HttpIdentityClient, IdentityError, IdentityResult, IdentityService, LoginGrant,
};
pub use profile::{PrincipalId, Profile, ProfileUpdate};
pub use session::{
    AuthSnapshot, AuthState, AuthStateCallback, AuthStateMachine, SessionConfig,
    SESSION_ENDED_MESSAGE,
};
pub use store::{CredentialStore, StoredSession};
pub use verifier::{SessionVerifier, VerificationFailure, VerifyConfig};
