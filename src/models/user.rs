use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credential record owned by the identity provider (Supabase `auth.users`).
/// The application only reads it; changes go through sign-in/sign-up calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
}

/// Claims carried by a Supabase access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// subject / user id
    pub sub: String,
    pub aud: Option<String>,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
    pub role: Option<String>,
    pub email: Option<String>,
}
