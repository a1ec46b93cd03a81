use std::env;
use std::str::FromStr;
use std::time::Duration;
use anyhow::{Context, Result};

/// Runtime configuration, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    /// When set, access tokens are verified with HS256 instead of only decoded.
    pub supabase_jwt_secret: Option<String>,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub username_email_domain: String,
    pub soal_bucket: String,
    pub max_upload_bytes: usize,
    pub session_idle_ttl: Duration,
    pub profile_retry_attempts: u32,
    pub profile_retry_delay: Duration,
    pub sign_out_timeout: Duration,
    pub guard_settle_timeout: Duration,
    /// How long `GET /auth/session/watch` holds a request open.
    pub guard_watch_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let supabase_url = env::var("SUPABASE_URL")
            .context("SUPABASE_URL not set")?
            .trim()
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key = env::var("SUPABASE_ANON_KEY")
            .context("SUPABASE_ANON_KEY not set")?
            .trim()
            .to_string();
        let supabase_service_role_key = env::var("SUPABASE_SERVICE_ROLE_KEY")
            .context("SUPABASE_SERVICE_ROLE_KEY not set")?
            .trim()
            .to_string();
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            supabase_service_role_key,
            supabase_jwt_secret,
            port: parse_var("PORT", 8080)?,
            allowed_origins,
            username_email_domain: env::var("USERNAME_EMAIL_DOMAIN")
                .unwrap_or_else(|_| "guru.local".into()),
            soal_bucket: env::var("SOAL_BUCKET").unwrap_or_else(|_| "soal".into()),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            session_idle_ttl: Duration::from_secs(parse_var("SESSION_IDLE_TTL_SECS", 8 * 60 * 60)?),
            profile_retry_attempts: parse_var("PROFILE_RETRY_ATTEMPTS", 5)?,
            profile_retry_delay: Duration::from_millis(parse_var("PROFILE_RETRY_DELAY_MS", 500)?),
            sign_out_timeout: Duration::from_millis(parse_var("SIGN_OUT_TIMEOUT_MS", 3000)?),
            guard_settle_timeout: Duration::from_millis(parse_var("GUARD_SETTLE_TIMEOUT_MS", 1500)?),
            guard_watch_timeout: Duration::from_millis(parse_var("GUARD_WATCH_TIMEOUT_MS", 25_000)?),
        })
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.supabase_url)
    }

    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.supabase_url)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} is not a valid value: {}", name, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
impl AppConfig {
    /// Config pointing at an unroutable backend, for tests that never reach the network.
    pub fn for_tests() -> Self {
        Self {
            supabase_url: "http://127.0.0.1:9".into(),
            supabase_anon_key: "anon".into(),
            supabase_service_role_key: "service".into(),
            supabase_jwt_secret: None,
            port: 0,
            allowed_origins: vec![],
            username_email_domain: "guru.local".into(),
            soal_bucket: "soal".into(),
            max_upload_bytes: 1024,
            session_idle_ttl: Duration::from_secs(60),
            profile_retry_attempts: 2,
            profile_retry_delay: Duration::from_millis(10),
            sign_out_timeout: Duration::from_millis(100),
            guard_settle_timeout: Duration::from_millis(500),
            guard_watch_timeout: Duration::from_millis(300),
        }
    }
}
