// src/repositories/profile_supabase_repo.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::profile::{Profile, ProfileChanges, Role};
use crate::models::user::Identity;
use crate::repositories::supabase_rest::{Caller, RepoError, SupabaseRest};

const PROFILES: &str = "profiles";

/// Profile fetch failed for a reason other than "no row yet".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("profile resolution failed: {0}")]
pub struct ResolutionError(pub String);

impl From<RepoError> for ResolutionError {
    fn from(e: RepoError) -> Self {
        ResolutionError(e.to_string())
    }
}

/// Turns an authenticated identity into its application profile.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// `Ok(None)` means the profile row does not exist (yet).
    async fn resolve(&self, identity: &Identity) -> Result<Option<Profile>, ResolutionError>;
}

/// Repository for the `profiles` table via Supabase (PostgREST)
#[derive(Clone)]
pub struct ProfileSupabaseRepo {
    rest: SupabaseRest,
}

impl ProfileSupabaseRepo {
    pub fn new(rest: SupabaseRest) -> Self {
        Self { rest }
    }

    /// Get profile by auth user id. Runs with the service key: the identity
    /// was already verified by the provider.
    pub async fn get_by_user_id(&self, user_id: Uuid) -> Result<Option<Profile>, RepoError> {
        let rows: Vec<Profile> = self
            .rest
            .select(
                Caller::Service,
                PROFILES,
                &[("user_id", format!("eq.{}", user_id)), ("select", "*".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Teacher accounts, alphabetical. Row-level security decides visibility.
    pub async fn list_gurus(&self, token: &str) -> Result<Vec<Profile>, RepoError> {
        self.rest
            .select(
                Caller::User(token),
                PROFILES,
                &[
                    ("role", format!("eq.{}", Role::Guru)),
                    ("select", "*".to_string()),
                    ("order", "nama.asc".to_string()),
                ],
            )
            .await
    }

    pub async fn username_taken(&self, username: &str, except: Option<Uuid>) -> Result<bool, RepoError> {
        #[derive(Deserialize)]
        struct Row {
            user_id: Uuid,
        }

        let rows: Vec<Row> = self
            .rest
            .select(
                Caller::Service,
                PROFILES,
                &[
                    ("username", format!("eq.{}", username)),
                    ("select", "user_id".to_string()),
                ],
            )
            .await?;
        Ok(rows.iter().any(|r| Some(r.user_id) != except))
    }

    pub async fn update_own(
        &self,
        token: &str,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Profile, RepoError> {
        #[derive(Serialize)]
        struct Patch<'a> {
            nama: &'a str,
            username: &'a str,
            updated_at: chrono::DateTime<chrono::Utc>,
        }

        let patch = Patch {
            nama: &changes.nama,
            username: &changes.username,
            updated_at: chrono::Utc::now(),
        };
        self.rest
            .update(Caller::User(token), PROFILES, ("user_id", user_id.to_string()), &patch)
            .await
    }

    /// Delete the profile row of a user (explicit admin action only).
    pub async fn delete_by_user_id(&self, token: &str, user_id: Uuid) -> Result<Profile, RepoError> {
        self.rest
            .delete(Caller::User(token), PROFILES, ("user_id", user_id.to_string()))
            .await
    }

    /// Server-side `has_role(_user_id, _role)` policy function.
    pub async fn has_role(&self, token: &str, user_id: Uuid, role: Role) -> Result<bool, RepoError> {
        self.rest
            .rpc(
                Caller::User(token),
                "has_role",
                &json!({ "_user_id": user_id, "_role": role.as_str() }),
            )
            .await
    }

    /// Server-side `get_user_role(_user_id)`; `None` when the user has no profile.
    pub async fn get_user_role(&self, token: &str, user_id: Uuid) -> Result<Option<Role>, RepoError> {
        let role: Option<String> = self
            .rest
            .rpc(Caller::User(token), "get_user_role", &json!({ "_user_id": user_id }))
            .await?;
        Ok(role.and_then(|r| r.parse().ok()))
    }
}

#[async_trait]
impl ProfileResolver for ProfileSupabaseRepo {
    async fn resolve(&self, identity: &Identity) -> Result<Option<Profile>, ResolutionError> {
        Ok(self.get_by_user_id(identity.id).await?)
    }
}
