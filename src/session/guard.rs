use super::store::{CredentialStore, StoredCredentials};
use crate::api::{AnswerService, AuthResponse, LoginRequest, RegisterRequest, UserIdentity};
use crate::{AyurError, Result};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shown when a stored token no longer works at startup
pub const SESSION_EXPIRED_NOTICE: &str = "Session expired. Please login again.";

const AUTH_REQUIRED: &str = "Authentication required. Please login again.";
const LOGIN_FAILED: &str = "Login failed. Please try again.";
const REGISTRATION_FAILED: &str = "Registration failed. Please try again.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Unauthenticated => write!(f, "Unauthenticated"),
            SessionStatus::Authenticating => write!(f, "Authenticating"),
            SessionStatus::Authenticated => write!(f, "Authenticated"),
        }
    }
}

/// Current credentials. `user` is present iff `status` is `Authenticated`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserIdentity>,
    pub status: SessionStatus,
}

/// Outcome of the startup probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The stored token is still valid
    Restored(UserIdentity),
    /// Nothing was stored
    SignedOut,
    /// The stored token was rejected and has been cleared
    Expired(String),
}

/// Registration form contents
#[derive(Debug, Clone)]
pub struct SignUpProfile {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Shared, cheaply cloned view of the session
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<RwLock<Session>>,
    store: Arc<dyn CredentialStore>,
}

impl SessionHandle {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            state: Arc::new(RwLock::new(Session::default())),
            store,
        }
    }

    pub fn snapshot(&self) -> Session {
        self.state.read().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.read().status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.state.read().user.clone()
    }

    /// The token to attach right now, or an auth error without a request
    pub fn require_token(&self) -> Result<String> {
        self.token()
            .ok_or_else(|| AyurError::Auth(AUTH_REQUIRED.to_string()))
    }

    /// Clear persisted and in-memory credentials. Idempotent.
    pub fn sign_out(&self) {
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear stored credentials: {}", e);
        }
        let mut state = self.state.write();
        if state.status != SessionStatus::Unauthenticated || state.token.is_some() {
            info!("Signed out");
        }
        *state = Session::default();
    }

    /// Sign out only if `token` is still the active one, so a late rejection
    /// of an old token cannot end a newer session
    pub fn expire_token(&self, token: &str) -> bool {
        if self.state.read().token.as_deref() != Some(token) {
            debug!("Ignoring rejection of a token that is no longer active");
            return false;
        }
        self.sign_out();
        true
    }

    /// Run an authenticated call with the current token. An auth failure
    /// signs the session out before the error reaches the caller.
    pub async fn authorized<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.require_token()?;
        let result = call(token.clone()).await;
        if let Err(e) = &result {
            if e.is_auth() {
                warn!("Service rejected the session token: {}", e);
                self.expire_token(&token);
            }
        }
        result
    }

    fn begin(&self, token: Option<String>) {
        let mut state = self.state.write();
        state.token = token;
        state.user = None;
        state.status = SessionStatus::Authenticating;
    }

    fn establish(&self, token: String, user: UserIdentity) {
        let credentials = StoredCredentials {
            token: token.clone(),
            user: Some(user.clone()),
        };
        if let Err(e) = self.store.save(&credentials) {
            warn!("Signed in but failed to persist credentials: {}", e);
        }
        let mut state = self.state.write();
        state.token = Some(token);
        state.user = Some(user);
        state.status = SessionStatus::Authenticated;
    }

    fn reset(&self) {
        *self.state.write() = Session::default();
    }

    fn load_stored(&self) -> Option<StoredCredentials> {
        match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable stored credentials: {}", e);
                None
            }
        }
    }
}

/// Owns the session lifecycle: probe, sign-in, sign-up and sign-out
pub struct SessionGuard {
    handle: SessionHandle,
    service: Arc<dyn AnswerService>,
    last_error: Mutex<Option<String>>,
}

impl SessionGuard {
    pub fn new(service: Arc<dyn AnswerService>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            handle: SessionHandle::new(store),
            service,
            last_error: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn session(&self) -> Session {
        self.handle.snapshot()
    }

    /// Last user-visible auth failure
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    /// Validate a persisted token at startup. Never fails: a rejected token
    /// is cleared and reported as a notice.
    pub async fn probe(&self) -> SessionNotice {
        let Some(stored) = self.handle.load_stored() else {
            debug!("No stored credentials");
            self.handle.reset();
            return SessionNotice::SignedOut;
        };

        info!("Checking stored session");
        self.handle.begin(Some(stored.token.clone()));

        match self.service.current_user(&stored.token).await {
            Ok(user) => {
                info!("Session restored for {}", user.username);
                self.handle.establish(stored.token, user.clone());
                SessionNotice::Restored(user)
            }
            Err(e) => {
                warn!("Stored session is no longer valid: {}", e);
                self.handle.sign_out();
                *self.last_error.lock() = Some(SESSION_EXPIRED_NOTICE.to_string());
                SessionNotice::Expired(SESSION_EXPIRED_NOTICE.to_string())
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity> {
        self.clear_error();
        self.handle.begin(None);
        info!("Signing in");

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = self.service.login(&request).await;
        self.complete(result, LOGIN_FAILED)
    }

    /// Register a new account. Password confirmation is checked before any
    /// request is sent.
    pub async fn sign_up(&self, profile: SignUpProfile) -> Result<UserIdentity> {
        self.clear_error();
        if profile.password != profile.confirm_password {
            let reason = "Passwords do not match".to_string();
            *self.last_error.lock() = Some(reason.clone());
            return Err(AyurError::Validation(reason));
        }

        self.handle.begin(None);
        info!("Registering {}", profile.username);

        let request = RegisterRequest {
            username: profile.username,
            email: profile.email,
            password: profile.password,
        };
        let result = self.service.register(&request).await;
        self.complete(result, REGISTRATION_FAILED)
    }

    pub fn sign_out(&self) {
        self.handle.sign_out();
    }

    fn complete(&self, result: Result<AuthResponse>, fallback: &str) -> Result<UserIdentity> {
        match result {
            Ok(AuthResponse { token, user }) => {
                info!("Authenticated as {}", user.username);
                self.handle.establish(token, user.clone());
                Ok(user)
            }
            Err(e) => {
                warn!("Authentication failed: {}", e);
                self.handle.reset();
                let reason = match e {
                    AyurError::Auth(reason) => reason,
                    AyurError::Service { message, .. } => message,
                    _ => fallback.to_string(),
                };
                *self.last_error.lock() = Some(reason.clone());
                Err(AyurError::Auth(reason))
            }
        }
    }
}
