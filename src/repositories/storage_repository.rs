// src/repositories/storage_repository.rs - Supabase Storage bucket for exam files
use reqwest::Client;
use serde_json::json;
use urlencoding::encode;

use crate::config::AppConfig;
use crate::repositories::supabase_rest::{classify, RepoError};

#[derive(Clone)]
pub struct StorageRepository {
    client: Client,
    storage_url: String,
    anon_key: String,
    bucket: String,
}

/// Percent-encode each path segment, keeping the `/` separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl StorageRepository {
    pub fn new(client: Client, cfg: &AppConfig) -> Self {
        Self {
            client,
            storage_url: cfg.storage_url(),
            anon_key: cfg.supabase_anon_key.clone(),
            bucket: cfg.soal_bucket.clone(),
        }
    }

    pub async fn upload(
        &self,
        token: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RepoError> {
        let url = format!("{}/object/{}/{}", self.storage_url, self.bucket, encode_path(path));
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify(status, &text));
        }
        Ok(())
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.storage_url, self.bucket, encode_path(path))
    }

    pub async fn remove(&self, token: &str, path: &str) -> Result<(), RepoError> {
        let url = format!("{}/object/{}", self.storage_url, self.bucket);
        let resp = self
            .client
            .delete(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify(status, &text));
        }
        Ok(())
    }
}
