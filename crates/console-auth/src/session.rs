//! Session lifecycle manager.
//!
//! `AuthStateMachine` owns the only mutable copy of the session. All state
//! lives behind one lock that is never held across an `.await`; results that
//! arrive after the suspension are applied only if no newer login, logout or
//! verification committed in the meantime (tracked by a sequencing epoch).

use crate::auth_fsm::{
    AuthPhase, AuthStateChangedPayload, LifecycleInput, LifecycleMachine, LifecycleState,
};
use crate::identity_client::{HttpIdentityClient, IdentityService};
use crate::store::CredentialStore;
use crate::verifier::{SessionVerifier, VerificationFailure, VerifyConfig};
use crate::{AuthError, AuthResult, Credential, Profile, ProfileUpdate, TokenValidator};
use console_config_and_utils::{AuthTuning, Config, Paths};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Error attached when the identity service ends a session.
pub const SESSION_ENDED_MESSAGE: &str = "Session ended";

const LOGIN_FAILED_MESSAGE: &str = "Login failed";

/// Committed authentication state.
///
/// A profile exists only inside `Authenticated`, always next to the credential
/// it was fetched with.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Uninitialized,
    Initializing,
    Authenticated {
        credential: Credential,
        profile: Profile,
    },
    Unauthenticated,
}

impl AuthState {
    pub fn phase(&self) -> AuthPhase {
        match self {
            AuthState::Uninitialized => AuthPhase::Uninitialized,
            AuthState::Initializing => AuthPhase::Initializing,
            AuthState::Authenticated { .. } => AuthPhase::Authenticated,
            AuthState::Unauthenticated => AuthPhase::Unauthenticated,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            AuthState::Authenticated { profile, .. } => Some(profile),
            _ => None,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            AuthState::Authenticated { credential, .. } => Some(credential),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub state: AuthState,
    /// Attached error. Together with `Authenticated` or `Unauthenticated` this
    /// is the degraded state; it never forces a logout on its own.
    pub error: Option<String>,
    /// Last-known profile surfaced while a stored credential is being
    /// verified. Advisory only; never set outside `Initializing`.
    pub optimistic_profile: Option<Profile>,
}

impl AuthSnapshot {
    pub fn phase(&self) -> AuthPhase {
        self.state.phase()
    }

    /// The committed profile.
    pub fn profile(&self) -> Option<&Profile> {
        self.state.profile()
    }

    /// Profile to render: the committed one, else the optimistic one.
    pub fn display_profile(&self) -> Option<&Profile> {
        self.state.profile().or(self.optimistic_profile.as_ref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    fn payload(&self) -> AuthStateChangedPayload {
        AuthStateChangedPayload {
            phase: self.phase(),
            user_id: self.profile().map(|p| p.id.to_string()),
            username: self.profile().map(|p| p.username.clone()),
            error: self.error.clone(),
        }
    }
}

/// Callback type for state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Timing and local-validation settings for the manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause before `initialize()` reads storage, so an immediate `login()`
    /// lands first.
    pub init_delay: Duration,
    pub validator: TokenValidator,
    /// Deadline for the best-effort logout notification.
    pub logout_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&AuthTuning::default())
    }
}

impl From<&AuthTuning> for SessionConfig {
    fn from(tuning: &AuthTuning) -> Self {
        Self {
            init_delay: Duration::from_millis(tuning.init_delay_ms),
            validator: TokenValidator::with_skew_secs(tuning.clock_skew_secs),
            logout_timeout: Duration::from_millis(tuning.verify_attempt_timeout_ms),
        }
    }
}

struct Inner {
    machine: LifecycleMachine,
    session: Option<(Credential, Profile)>,
    optimistic_profile: Option<Profile>,
    error: Option<String>,
    /// Advanced by every commit that replaces or removes the pair.
    epoch: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            machine: LifecycleMachine::new(),
            session: None,
            optimistic_profile: None,
            error: None,
            epoch: 0,
        }
    }

    fn transition(&mut self, input: LifecycleInput) -> AuthResult<()> {
        let old_phase = AuthPhase::from(self.machine.state());
        self.machine.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.machine.state()
            ))
        })?;

        let new_phase = AuthPhase::from(self.machine.state());
        if old_phase != new_phase {
            debug!(old_phase = ?old_phase, new_phase = ?new_phase, "Auth state transition");
        }
        Ok(())
    }

    /// Commit a verified pair.
    fn authenticate(&mut self, input: LifecycleInput, credential: Credential, profile: Profile) {
        if let Err(e) = self.transition(input) {
            warn!(error = %e, "Unexpected transition while committing a session");
        }
        self.session = Some((credential, profile));
        self.optimistic_profile = None;
        self.epoch += 1;
    }

    /// Drop the pair and land in `Unauthenticated`.
    fn unauthenticate(&mut self, input: LifecycleInput) {
        if let Err(e) = self.transition(input) {
            warn!(error = %e, "Unexpected transition while ending a session");
        }
        self.session = None;
        self.optimistic_profile = None;
        self.epoch += 1;
    }

    fn snapshot(&self) -> AuthSnapshot {
        let state = match (self.machine.state(), &self.session) {
            (LifecycleState::Uninitialized, _) => AuthState::Uninitialized,
            (LifecycleState::Initializing, _) => AuthState::Initializing,
            (LifecycleState::Authenticated, Some((credential, profile))) => {
                AuthState::Authenticated {
                    credential: credential.clone(),
                    profile: profile.clone(),
                }
            }
            // The pair and the phase always change together.
            (LifecycleState::Authenticated, None) | (LifecycleState::Unauthenticated, _) => {
                AuthState::Unauthenticated
            }
        };

        AuthSnapshot {
            state,
            error: self.error.clone(),
            optimistic_profile: self.optimistic_profile.clone(),
        }
    }
}

/// What `initialize()` found in storage.
enum StartupCredential {
    Resolved(AuthSnapshot),
    NeedsVerification(Credential),
}

/// Orchestrates credential storage, local validation and server verification
/// into one session lifecycle.
pub struct AuthStateMachine {
    store: CredentialStore,
    verifier: SessionVerifier,
    identity: Arc<dyn IdentityService>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    /// Optional callback for state change notifications.
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl AuthStateMachine {
    pub fn new(
        store: CredentialStore,
        verifier: SessionVerifier,
        identity: Arc<dyn IdentityService>,
    ) -> Self {
        Self::with_config(store, verifier, identity, SessionConfig::default())
    }

    pub fn with_config(
        store: CredentialStore,
        verifier: SessionVerifier,
        identity: Arc<dyn IdentityService>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            identity,
            config,
            inner: Mutex::new(Inner::new()),
            state_callback: Mutex::new(None),
        }
    }

    /// Build the production manager: file-backed store under `paths` and an
    /// HTTP client for the configured identity service.
    pub fn from_config(config: &Config, paths: &Paths) -> AuthResult<Self> {
        paths.ensure_dirs()?;
        let storage = console_storage::create_storage(paths)?;
        let identity: Arc<dyn IdentityService> =
            Arc::new(HttpIdentityClient::new(config.identity_url()?.as_str())?);
        let verifier = SessionVerifier::with_config(identity.clone(), VerifyConfig::from(&config.auth));

        Ok(Self::with_config(
            CredentialStore::new(storage),
            verifier,
            identity,
            SessionConfig::from(&config.auth),
        ))
    }

    /// Set a callback to be notified of state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn phase(&self) -> AuthPhase {
        AuthPhase::from(self.inner.lock().machine.state())
    }

    pub fn profile(&self) -> Option<Profile> {
        self.inner.lock().session.as_ref().map(|(_, p)| p.clone())
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.lock().session.as_ref().map(|(c, _)| c.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    /// `Authorization` header value for the current session.
    pub fn authorization_header(&self) -> Option<String> {
        self.credential().map(|c| c.bearer())
    }

    /// Run `f` against the state and notify subscribers if the visible
    /// snapshot changed. The callback runs after the state lock is released.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let (result, changed) = {
            let mut inner = self.inner.lock();
            let before = inner.snapshot();
            let result = f(&mut *inner);
            let after = inner.snapshot();
            (result, (before != after).then_some(after))
        };

        if let Some(snapshot) = changed {
            self.notify_state_change(&snapshot);
        }
        result
    }

    fn notify_state_change(&self, snapshot: &AuthSnapshot) {
        let callback = self.state_callback.lock();
        if let Some(callback) = callback.as_ref() {
            callback(snapshot.payload());
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    /// Restore the session persisted by a previous run.
    ///
    /// Only the first call does anything; later calls return the current
    /// snapshot. Never fails: every outcome resolves to a terminal phase.
    pub async fn initialize(&self) -> AuthSnapshot {
        let epoch = self.update(|inner| {
            if *inner.machine.state() != LifecycleState::Uninitialized {
                return None;
            }
            inner.transition(LifecycleInput::Initialize).ok()?;
            Some(inner.epoch)
        });
        let Some(epoch) = epoch else {
            debug!("Session already initialized");
            return self.snapshot();
        };

        tokio::time::sleep(self.config.init_delay).await;

        let startup = self.update(|inner| {
            if inner.epoch != epoch {
                debug!("Initialization superseded before reading storage");
                return StartupCredential::Resolved(inner.snapshot());
            }

            let stored = match self.store.load() {
                Ok(Some(stored)) => stored,
                Ok(None) => {
                    info!("No stored session found");
                    inner.unauthenticate(LifecycleInput::CredentialMissing);
                    return StartupCredential::Resolved(inner.snapshot());
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stored session");
                    inner.unauthenticate(LifecycleInput::StorageUnavailable);
                    return StartupCredential::Resolved(inner.snapshot());
                }
            };

            if self.config.validator.is_definitely_expired(&stored.credential) {
                info!("Stored credential has expired, clearing session");
                self.clear_store();
                inner.unauthenticate(LifecycleInput::CredentialExpired);
                return StartupCredential::Resolved(inner.snapshot());
            }

            if let Err(e) = inner.transition(LifecycleInput::CredentialFound) {
                warn!(error = %e, "Unexpected transition while restoring a session");
            }
            inner.optimistic_profile = stored.profile;
            StartupCredential::NeedsVerification(stored.credential)
        });

        let credential = match startup {
            StartupCredential::Resolved(snapshot) => return snapshot,
            StartupCredential::NeedsVerification(credential) => credential,
        };

        let result = self.verifier.verify(&credential).await;

        self.update(|inner| {
            if inner.epoch != epoch {
                debug!("Initialization superseded, discarding verification result");
            } else {
                self.apply_verification(inner, credential, result);
            }
            inner.snapshot()
        })
    }

    /// Re-verify the current credential. A rejection or an exhausted retry
    /// budget ends the session.
    pub async fn refresh(&self) -> AuthSnapshot {
        let pending = {
            let inner = self.inner.lock();
            inner
                .session
                .as_ref()
                .map(|(credential, _)| (credential.clone(), inner.epoch))
        };
        let Some((credential, epoch)) = pending else {
            debug!("No session to refresh");
            return self.snapshot();
        };

        let result = self.verifier.verify(&credential).await;

        self.update(|inner| {
            if inner.epoch != epoch {
                debug!("Session changed during refresh, discarding result");
            } else {
                self.apply_verification(inner, credential, result);
            }
            inner.snapshot()
        })
    }

    fn apply_verification(
        &self,
        inner: &mut Inner,
        credential: Credential,
        result: Result<Profile, VerificationFailure>,
    ) {
        match result {
            Ok(profile) => {
                if let Err(e) = self.store.save(&credential, &profile) {
                    warn!(error = %e, "Failed to persist verified session");
                }
                info!(user_id = %profile.id, "Session verified");
                inner.authenticate(LifecycleInput::Verified, credential, profile);
            }
            Err(failure) => {
                match &failure {
                    VerificationFailure::Rejected(detail) => {
                        warn!(detail = %detail, "Stored credential rejected, clearing session");
                    }
                    VerificationFailure::Exhausted {
                        attempts,
                        last_error,
                    } => {
                        warn!(
                            attempts = *attempts,
                            last_error = %last_error,
                            "Session verification exhausted retries, clearing session"
                        );
                    }
                }
                self.clear_store();
                inner.unauthenticate(LifecycleInput::VerificationFailed);
                inner.error = Some(SESSION_ENDED_MESSAGE.to_string());
            }
        }
    }

    /// Exchange username and password for a fresh session.
    ///
    /// On failure the message is attached to the state and returned; the
    /// phase and any existing session are left untouched.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<AuthSnapshot> {
        debug!(username = %username, "Attempting password login");

        let outcome = match self.identity.login(username, password).await {
            Ok(grant) => {
                let credential = Credential::new(grant.access_token);
                match self.verifier.verify(&credential).await {
                    Ok(profile) => Ok((credential, profile)),
                    Err(VerificationFailure::Rejected(detail)) => Err(AuthError::LoginFailed(detail)),
                    Err(failure @ VerificationFailure::Exhausted { .. }) => {
                        warn!(error = %failure, "Could not load profile after login");
                        Err(AuthError::LoginFailed(LOGIN_FAILED_MESSAGE.to_string()))
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                Err(AuthError::LoginFailed(e.detail()))
            }
        };

        self.update(|inner| {
            let (credential, profile) = match outcome {
                Ok(pair) => pair,
                Err(e) => {
                    inner.error = Some(e.to_string());
                    return Err(e);
                }
            };

            if let Err(e) = self.store.save(&credential, &profile) {
                warn!(error = %e, "Failed to persist new session");
                let e = AuthError::from(e);
                inner.error = Some(e.to_string());
                return Err(e);
            }

            info!(user_id = %profile.id, "Login successful");
            inner.error = None;
            inner.authenticate(LifecycleInput::LoginSucceeded, credential, profile);
            Ok(inner.snapshot())
        })
    }

    /// End the session. Local state is cleared first and unconditionally;
    /// the identity service is then told on a best-effort basis.
    pub async fn logout(&self) -> AuthSnapshot {
        let (credential, snapshot) = self.update(|inner| {
            let credential = inner
                .session
                .take()
                .map(|(credential, _)| credential)
                .or_else(|| self.store.load().ok().flatten().map(|s| s.credential));

            self.clear_store();
            inner.unauthenticate(LifecycleInput::LogoutCompleted);
            inner.error = None;
            (credential, inner.snapshot())
        });
        info!("Logged out");

        if let Some(credential) = credential {
            let notified =
                tokio::time::timeout(self.config.logout_timeout, self.identity.logout(&credential))
                    .await;
            match notified {
                Ok(Ok(())) => debug!("Identity service acknowledged logout"),
                Ok(Err(e)) => debug!(error = %e, "Logout notification failed, ignoring"),
                Err(_) => debug!("Logout notification timed out, ignoring"),
            }
        }

        snapshot
    }

    /// Remove the attached error without touching anything else.
    pub fn clear_error(&self) -> AuthSnapshot {
        self.update(|inner| {
            inner.error = None;
            inner.snapshot()
        })
    }

    /// Send a partial profile to `PUT /me` and store the returned profile with
    /// the current credential. A rejected credential ends the session.
    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthResult<Profile> {
        let (credential, current, epoch) = {
            let inner = self.inner.lock();
            let (credential, profile) = inner.session.as_ref().ok_or(AuthError::NotLoggedIn)?;
            (credential.clone(), profile.clone(), inner.epoch)
        };
        if update.is_empty() {
            return Ok(current);
        }

        let result = self.identity.update_profile(&credential, &update).await;

        self.update(|inner| {
            if inner.epoch != epoch {
                debug!("Session changed during profile update, discarding result");
                return Err(AuthError::SessionEnded(
                    "session changed during profile update".to_string(),
                ));
            }

            match result {
                Ok(profile) => {
                    self.store.save(&credential, &profile)?;
                    debug!(user_id = %profile.id, "Profile updated");
                    inner.authenticate(LifecycleInput::ProfileUpdated, credential, profile.clone());
                    Ok(profile)
                }
                Err(e) if e.is_rejection() => {
                    warn!(detail = %e.detail(), "Credential rejected during profile update");
                    self.clear_store();
                    inner.unauthenticate(LifecycleInput::VerificationFailed);
                    inner.error = Some(SESSION_ENDED_MESSAGE.to_string());
                    Err(AuthError::SessionEnded(e.detail()))
                }
                Err(e) => Err(AuthError::Identity(e)),
            }
        })
    }
}
