// src/services/auth_services.rs - Supabase GoTrue client, one per browser session
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::{debug, info, warn};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::user::{Identity, JwtClaims};
use crate::services::identity_provider::{
    AuthChange, AuthError, AuthEvent, AuthSubscription, IdentityProvider, SignUpOutcome,
    SignUpRequest,
};

/// Refresh the access token when it expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 60;
const CHANGE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
struct AuthTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: i64,
    identity: Identity,
}

/// What `access_token` finds in the store before deciding to refresh.
enum Stored {
    Missing,
    Fresh(String),
    Expiring { access_token: String, refresh_token: Option<String> },
}

fn holds_refresh_token(tokens: &Option<AuthTokens>, refresh_token: &str) -> bool {
    tokens
        .as_ref()
        .is_some_and(|t| t.refresh_token.as_deref() == Some(refresh_token))
}

#[derive(Deserialize)]
struct TokenResp {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: Option<UserInfo>,
}

#[derive(Deserialize)]
struct UserInfo {
    id: String,
    email: Option<String>,
}

/// Pull the human readable message out of a GoTrue error body.
pub(crate) fn supabase_message(text: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(text) {
        for key in ["msg", "message", "error_description", "error"] {
            if let Some(msg) = error_json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    text.to_string()
}

/// Decode access-token claims. With a secret the HS256 signature is checked,
/// otherwise the token is trusted as received from GoTrue and only decoded.
pub fn decode_claims(token: &str, jwt_secret: Option<&str>) -> Result<JwtClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);
    validation.validate_exp = false;

    let key = match jwt_secret {
        Some(secret) => DecodingKey::from_secret(secret.as_bytes()),
        None => {
            validation.insecure_disable_signature_validation();
            DecodingKey::from_secret(&[])
        }
    };

    decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("access token rejected: {}", e);
            AuthError::InvalidToken
        })
}

/// Browser-session scoped GoTrue client: holds that session's tokens and
/// publishes identity changes to its subscribers.
pub struct SupabaseAuthClient {
    client: reqwest::Client,
    auth_url: String,
    anon_key: String,
    jwt_secret: Option<String>,
    tokens: Mutex<Option<AuthTokens>>,
    /// GoTrue rotates refresh tokens, so only one refresh may be in flight.
    refreshing: tokio::sync::Mutex<()>,
    changes: broadcast::Sender<AuthChange>,
}

impl SupabaseAuthClient {
    pub fn new(client: reqwest::Client, cfg: &AppConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            client,
            auth_url: cfg.auth_url(),
            anon_key: cfg.supabase_anon_key.clone(),
            jwt_secret: cfg.supabase_jwt_secret.clone(),
            tokens: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
            changes,
        }
    }

    fn current_identity(&self) -> Option<Identity> {
        self.tokens.lock().as_ref().map(|t| t.identity.clone())
    }

    fn stored(&self) -> Stored {
        match self.tokens.lock().as_ref() {
            None => Stored::Missing,
            Some(t) if t.expires_at - Utc::now().timestamp() > REFRESH_MARGIN_SECS => {
                Stored::Fresh(t.access_token.clone())
            }
            Some(t) => Stored::Expiring {
                access_token: t.access_token.clone(),
                refresh_token: t.refresh_token.clone(),
            },
        }
    }

    fn emit(&self, event: AuthEvent) {
        let change = AuthChange::new(event, self.current_identity());
        // No receivers simply means nobody is listening yet.
        let _ = self.changes.send(change);
    }

    /// Turn a token grant response into stored tokens, checking that the
    /// token subject matches the returned user.
    fn accept_tokens(&self, tr: TokenResp) -> Result<AuthTokens, AuthError> {
        let claims = decode_claims(&tr.access_token, self.jwt_secret.as_deref())?;

        let user = tr
            .user
            .ok_or_else(|| AuthError::Supabase("No user info in token response".to_string()))?;
        let user_id = Uuid::parse_str(&user.id)?;
        if Uuid::parse_str(&claims.sub)? != user_id {
            warn!("token subject {} does not match user {}", claims.sub, user_id);
            return Err(AuthError::InvalidToken);
        }

        let expires_at = match (claims.exp, tr.expires_in) {
            (Some(exp), _) => exp as i64,
            (None, Some(expires_in)) => Utc::now().timestamp() + expires_in,
            (None, None) => Utc::now().timestamp() + 3600,
        };

        Ok(AuthTokens {
            access_token: tr.access_token,
            refresh_token: tr.refresh_token,
            expires_at,
            identity: Identity {
                id: user_id,
                email: user.email.or(claims.email).unwrap_or_default(),
            },
        })
    }

    async fn grant(&self, grant_type: &str, body: &impl Serialize) -> Result<TokenResp, AuthError> {
        let url = format!("{}/token?grant_type={}", self.auth_url, grant_type);

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            debug!("{} grant rejected: {}", grant_type, supabase_message(&text));
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::Supabase(format!(
                "{} grant failed: {} {}",
                grant_type,
                status,
                supabase_message(&text)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| AuthError::Supabase(format!("invalid json in token response: {}", e)))
    }

    async fn refresh(&self, refresh_token: String) -> Result<Option<String>, AuthError> {
        #[derive(Serialize)]
        struct RefreshBody {
            refresh_token: String,
        }

        let body = RefreshBody { refresh_token: refresh_token.clone() };
        match self.grant("refresh_token", &body).await {
            Ok(tr) => {
                let tokens = self.accept_tokens(tr)?;
                let access_token = tokens.access_token.clone();
                {
                    // A sign-out or new sign-in while the grant was running wins.
                    let mut stored = self.tokens.lock();
                    if !holds_refresh_token(&stored, &refresh_token) {
                        debug!("session changed during refresh, dropping refreshed tokens");
                        return Ok(stored.as_ref().map(|t| t.access_token.clone()));
                    }
                    *stored = Some(tokens);
                }
                self.emit(AuthEvent::TokenRefreshed);
                Ok(Some(access_token))
            }
            Err(AuthError::InvalidCredentials) => {
                {
                    let mut stored = self.tokens.lock();
                    if !holds_refresh_token(&stored, &refresh_token) {
                        return Ok(stored.as_ref().map(|t| t.access_token.clone()));
                    }
                    *stored = None;
                }
                info!("refresh token no longer valid, signing out locally");
                self.emit(AuthEvent::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        #[derive(Serialize)]
        struct LoginBody<'a> {
            email: &'a str,
            password: &'a str,
        }

        let tr = self.grant("password", &LoginBody { email, password }).await?;
        let tokens = self.accept_tokens(tr)?;
        info!("signed in user {}", tokens.identity.id);
        *self.tokens.lock() = Some(tokens);
        self.emit(AuthEvent::SignedIn);
        Ok(())
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        #[derive(Serialize)]
        struct Body<'a> {
            email: &'a str,
            password: &'a str,
            data: serde_json::Value,
        }

        let body = Body {
            email: request.email.trim(),
            password: &request.password,
            data: request.metadata(),
        };

        let url = format!("{}/signup", self.auth_url);
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let msg = supabase_message(&text);
            if msg.contains("already registered") || msg.contains("already been registered") {
                return Err(AuthError::DuplicateEmail);
            }
            return Err(AuthError::Supabase(format!("signup failed: {} {}", status, msg)));
        }

        let json_val: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| AuthError::Supabase(format!("invalid json: {}", e)))?;

        // Auto-confirm projects answer with a full session, others only with the user.
        if json_val.get("access_token").is_some() {
            let tr: TokenResp = serde_json::from_value(json_val)
                .map_err(|e| AuthError::Supabase(format!("invalid signup session: {}", e)))?;
            let tokens = self.accept_tokens(tr)?;
            info!("signed up and signed in user {}", tokens.identity.id);
            *self.tokens.lock() = Some(tokens);
            self.emit(AuthEvent::SignedIn);
            return Ok(SignUpOutcome::SignedIn);
        }

        let user_id = json_val
            .get("user")
            .and_then(|u| u.get("id"))
            .or_else(|| json_val.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::Supabase("signup returned no user id".to_string()))?;
        info!("signed up user {} (confirmation pending)", Uuid::parse_str(user_id)?);
        Ok(SignUpOutcome::ConfirmationRequired)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.tokens.lock().take();
        self.emit(AuthEvent::SignedOut);

        let Some(tokens) = previous else {
            return Ok(());
        };

        let url = format!("{}/logout", self.auth_url);
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::Supabase(format!(
                "logout failed: {} {}",
                status,
                supabase_message(&text)
            )));
        }
        Ok(())
    }

    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        match self.stored() {
            Stored::Missing => return Ok(None),
            Stored::Fresh(access_token) => return Ok(Some(access_token)),
            Stored::Expiring { .. } => {}
        }

        // Callers that queued behind a refresh see the rotated tokens here.
        let _refreshing = self.refreshing.lock().await;
        match self.stored() {
            Stored::Missing => Ok(None),
            Stored::Fresh(access_token) => Ok(Some(access_token)),
            Stored::Expiring { access_token, refresh_token: None } => Ok(Some(access_token)),
            Stored::Expiring { refresh_token: Some(refresh_token), .. } => self.refresh(refresh_token).await,
        }
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        let rx = self.changes.subscribe();
        let initial = AuthChange::new(AuthEvent::InitialSession, self.current_identity());
        AuthSubscription::new(initial, rx)
    }
}
