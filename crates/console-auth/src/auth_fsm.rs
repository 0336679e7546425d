//! Session lifecycle state machine using rust-fsm.
//!
//! The FSM only tracks which phase the session is in. The credential and
//! profile that belong to `Authenticated` live next to it in the session
//! manager and are swapped together with each transition.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │  Uninitialized  │ (initial)
//! └────────┬────────┘
//!          │ Initialize
//!          ▼
//! ┌─────────────────┐  CredentialFound (optimistic profile surfaced)
//! │  Initializing   │ ◄──────────────┐
//! └────────┬────────┘ ───────────────┘
//!          │
//!          │ Verified / LoginSucceeded         CredentialMissing
//!          │                                   CredentialExpired
//!          ▼                                   VerificationFailed
//! ┌─────────────────┐                          StorageUnavailable
//! │  Authenticated  │                                  │
//! └────────┬────────┘                                  ▼
//!          │ VerificationFailed            ┌─────────────────┐
//!          │ LogoutCompleted  ───────────► │ Unauthenticated │
//!          │                               └────────┬────────┘
//!          ◄────────────── LoginSucceeded ──────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub lifecycle_machine(Uninitialized)

    Uninitialized => {
        Initialize => Initializing,
        // login() and logout() are accepted before initialize() runs
        LoginSucceeded => Authenticated,
        LogoutCompleted => Unauthenticated
    },
    Initializing => {
        CredentialMissing => Unauthenticated,
        CredentialExpired => Unauthenticated,
        // Stored credential deferred to the server; stay put
        CredentialFound => Initializing,
        Verified => Authenticated,
        VerificationFailed => Unauthenticated,
        StorageUnavailable => Unauthenticated,
        LoginSucceeded => Authenticated,
        LogoutCompleted => Unauthenticated
    },
    Authenticated => {
        // A new pair always replaces the old one
        LoginSucceeded => Authenticated,
        Verified => Authenticated,
        ProfileUpdated => Authenticated,
        VerificationFailed => Unauthenticated,
        LogoutCompleted => Unauthenticated
    },
    Unauthenticated => {
        LoginSucceeded => Authenticated,
        LogoutCompleted => Unauthenticated
    }
}

pub use lifecycle_machine::Input as LifecycleInput;
pub use lifecycle_machine::State as LifecycleState;
pub use lifecycle_machine::StateMachine as LifecycleMachine;

/// Simplified, serializable view of the lifecycle for UI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// `initialize()` has not been called yet.
    Uninitialized,
    /// Reading storage or waiting on the identity service.
    Initializing,
    /// Holding a verified credential/profile pair.
    Authenticated,
    /// No session.
    Unauthenticated,
}

impl AuthPhase {
    /// Returns true if privileged views may be shown.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthPhase::Authenticated)
    }

    /// Returns true while the outcome is still pending.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthPhase::Uninitialized | AuthPhase::Initializing)
    }
}

impl From<&LifecycleState> for AuthPhase {
    fn from(state: &LifecycleState) -> Self {
        match state {
            LifecycleState::Uninitialized => AuthPhase::Uninitialized,
            LifecycleState::Initializing => AuthPhase::Initializing,
            LifecycleState::Authenticated => AuthPhase::Authenticated,
            LifecycleState::Unauthenticated => AuthPhase::Unauthenticated,
        }
    }
}

/// Payload delivered to state-change subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current phase.
    pub phase: AuthPhase,
    /// Principal id when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Principal handle when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Attached error message, if degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
