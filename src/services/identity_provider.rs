// Contract of the external identity provider as seen by the session core.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::models::profile::Role;
use crate::models::user::Identity;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid email/username or password")]
    InvalidCredentials,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("invalid token")]
    InvalidToken,
    #[error("parse uuid error")]
    UuidError(#[from] uuid::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("supabase error: {0}")]
    Supabase(String),
}

/// Kind of identity change, mirroring the provider's `onAuthStateChange` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub identity: Option<Identity>,
}

impl AuthChange {
    pub fn new(event: AuthEvent, identity: Option<Identity>) -> Self {
        Self { event, identity }
    }
}

/// One subscriber's view of the change stream: its own `InitialSession`
/// first, then every change broadcast after it subscribed.
pub struct AuthSubscription {
    initial: Option<AuthChange>,
    changes: broadcast::Receiver<AuthChange>,
}

impl AuthSubscription {
    pub fn new(initial: AuthChange, changes: broadcast::Receiver<AuthChange>) -> Self {
        Self { initial: Some(initial), changes }
    }

    pub async fn recv(&mut self) -> Result<AuthChange, RecvError> {
        match self.initial.take() {
            Some(initial) => Ok(initial),
            None => self.changes.recv().await,
        }
    }
}

/// Self-registration input. Every account created this way is a `guru`.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub nama: String,
    pub username: String,
}

impl SignUpRequest {
    /// User metadata read by the server-side trigger that provisions `profiles`.
    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "nama": self.nama,
            "username": self.username,
            "role": Role::Guru.as_str(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The provider returned a session; a `SignedIn` event follows.
    SignedIn,
    /// Account created but e-mail confirmation is pending; no session yet.
    ConfirmationRequired,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify credentials. On success the change stream emits `SignedIn`.
    async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError>;

    /// Drop the local token and invalidate it remotely.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Current access token, refreshed first when close to expiry.
    async fn access_token(&self) -> Result<Option<String>, AuthError>;

    /// Subscribe to identity changes. The first event is always
    /// `InitialSession` with the current identity, delivered to this
    /// subscriber only.
    fn on_auth_state_change(&self) -> AuthSubscription;
}
