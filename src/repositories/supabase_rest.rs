// src/repositories/supabase_rest.rs - thin PostgREST table client shared by all repositories
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;
use crate::services::auth_services::supabase_message;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not allowed: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    #[error("supabase error: {0}")]
    Supabase(String),
}

/// Who the request runs as. `User` keeps row-level security in force;
/// `Service` bypasses it and is reserved for server-side lookups.
#[derive(Debug, Clone, Copy)]
pub enum Caller<'a> {
    User(&'a str),
    Service,
}

/// Map a non-success PostgREST response to an error.
pub(crate) fn classify(status: StatusCode, text: &str) -> RepoError {
    let msg = supabase_message(text);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RepoError::Forbidden(msg),
        StatusCode::CONFLICT => RepoError::Conflict(msg),
        StatusCode::NOT_FOUND => RepoError::NotFound,
        _ => RepoError::Supabase(format!("{} -> {}", status.as_u16(), msg)),
    }
}

#[derive(Clone)]
pub struct SupabaseRest {
    client: Client,
    base_rest_url: String,
    anon_key: String,
    service_role_key: String,
}

impl SupabaseRest {
    pub fn new(client: Client, cfg: &AppConfig) -> Self {
        Self {
            client,
            base_rest_url: cfg.rest_url(),
            anon_key: cfg.supabase_anon_key.clone(),
            service_role_key: cfg.supabase_service_role_key.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_rest_url, table)
    }

    fn authorize(&self, req: RequestBuilder, caller: Caller<'_>) -> RequestBuilder {
        match caller {
            Caller::User(token) => req.header("apikey", &self.anon_key).bearer_auth(token),
            Caller::Service => req
                .header("apikey", &self.service_role_key)
                .bearer_auth(&self.service_role_key),
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<String, RepoError> {
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            debug!("postgrest error {}: {}", status, text);
            return Err(classify(status, &text));
        }
        Ok(text)
    }

    /// `GET /<table>?<query>`; query pairs use PostgREST syntax (`id=eq.<v>`, `order=nama.asc`).
    pub async fn select<T: DeserializeOwned>(
        &self,
        caller: Caller<'_>,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RepoError> {
        let req = self.client.get(self.table_url(table)).query(query);
        let text = self.send(self.authorize(req, caller)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn insert<T: DeserializeOwned>(
        &self,
        caller: Caller<'_>,
        table: &str,
        row: &impl Serialize,
    ) -> Result<T, RepoError> {
        let req = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row);
        let text = self.send(self.authorize(req, caller)).await?;
        first_row(&text)
    }

    /// Patch the row with the given `id`. An empty representation means the
    /// row does not exist or row-level security hid it.
    pub async fn update<T: DeserializeOwned>(
        &self,
        caller: Caller<'_>,
        table: &str,
        filter: (&str, String),
        changes: &impl Serialize,
    ) -> Result<T, RepoError> {
        let req = self
            .client
            .patch(self.table_url(table))
            .query(&[(filter.0, format!("eq.{}", filter.1))])
            .header("Prefer", "return=representation")
            .json(changes);
        let text = self.send(self.authorize(req, caller)).await?;
        first_row(&text)
    }

    /// Delete matching rows and return what was deleted.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        caller: Caller<'_>,
        table: &str,
        filter: (&str, String),
    ) -> Result<T, RepoError> {
        let req = self
            .client
            .delete(self.table_url(table))
            .query(&[(filter.0, format!("eq.{}", filter.1))])
            .header("Prefer", "return=representation");
        let text = self.send(self.authorize(req, caller)).await?;
        first_row(&text)
    }

    /// Call a SQL function through `POST /rpc/<name>`.
    pub async fn rpc<T: DeserializeOwned>(
        &self,
        caller: Caller<'_>,
        function: &str,
        args: &impl Serialize,
    ) -> Result<T, RepoError> {
        let req = self
            .client
            .post(format!("{}/rpc/{}", self.base_rest_url, function))
            .json(args);
        let text = self.send(self.authorize(req, caller)).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn first_row<T: DeserializeOwned>(text: &str) -> Result<T, RepoError> {
    let arr: Vec<Value> = serde_json::from_str(text)?;
    let first = arr.into_iter().next().ok_or(RepoError::NotFound)?;
    Ok(serde_json::from_value(first)?)
}
