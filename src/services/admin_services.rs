// src/services/admin_services.rs - service-role account management for admins
use log::info;
use reqwest::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::services::auth_services::supabase_message;
use crate::services::identity_provider::{AuthError, SignUpRequest};

/// GoTrue admin API. Holds the service-role key, so every caller must have
/// confirmed the acting user is an admin against the database first.
#[derive(Clone)]
pub struct AdminAuthService {
    client: reqwest::Client,
    auth_url: String,
    service_role_key: String,
}

impl AdminAuthService {
    pub fn new(client: reqwest::Client, cfg: &AppConfig) -> Self {
        Self {
            client,
            auth_url: cfg.auth_url(),
            service_role_key: cfg.supabase_service_role_key.clone(),
        }
    }

    /// Create a confirmed teacher identity. The metadata is the same as for
    /// self-registration, so the profile trigger treats both alike.
    pub async fn create_guru(&self, request: &SignUpRequest) -> Result<Uuid, AuthError> {
        #[derive(Serialize)]
        struct Body<'a> {
            email: &'a str,
            password: &'a str,
            email_confirm: bool,
            user_metadata: serde_json::Value,
        }

        let body = Body {
            email: &request.email,
            password: &request.password,
            email_confirm: true,
            user_metadata: request.metadata(),
        };

        let url = format!("{}/admin/users", self.auth_url);
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let msg = supabase_message(&text);
            if status == StatusCode::UNPROCESSABLE_ENTITY || msg.contains("already been registered") {
                return Err(AuthError::DuplicateEmail);
            }
            return Err(AuthError::Supabase(format!("create user failed: {} {}", status, msg)));
        }

        let json_val: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| AuthError::Supabase(format!("invalid json: {}", e)))?;
        let user_id = json_val
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::Supabase("create user returned no id".to_string()))?;
        let user_id = Uuid::parse_str(user_id)?;
        info!("admin created guru account {}", user_id);
        Ok(user_id)
    }

    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let url = format!("{}/admin/users/{}", self.auth_url, user_id);
        let resp = self
            .client
            .delete(&url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::Supabase(format!(
                "delete user failed: {} {}",
                status,
                supabase_message(&text)
            )));
        }
        info!("admin deleted account {}", user_id);
        Ok(())
    }
}
