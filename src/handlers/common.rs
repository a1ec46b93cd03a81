// src/handlers/common.rs - response envelope and error-to-status mapping
use actix_web::HttpResponse;
use log::{error, warn};
use serde::Serialize;

use crate::repositories::supabase_rest::RepoError;
use crate::services::identity_provider::AuthError;
use crate::services::upload_service::UploadError;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::error(message))
}

/// Relational store failures. The cause is logged, the client gets a short message.
pub fn repo_error(context: &str, e: RepoError) -> HttpResponse {
    match e {
        RepoError::Forbidden(msg) => {
            warn!("{}: forbidden: {}", context, msg);
            HttpResponse::Forbidden().json(ApiResponse::error("Not allowed"))
        }
        RepoError::Conflict(msg) => {
            warn!("{}: conflict: {}", context, msg);
            HttpResponse::Conflict().json(ApiResponse::error(format!("Already exists: {}", msg)))
        }
        RepoError::NotFound => HttpResponse::NotFound().json(ApiResponse::error("Not found")),
        other => {
            error!("{}: {}", context, other);
            HttpResponse::BadGateway().json(ApiResponse::error(format!("{} failed", context)))
        }
    }
}

pub fn auth_error(context: &str, e: AuthError) -> HttpResponse {
    match e {
        AuthError::Validation(msg) => bad_request(msg),
        AuthError::InvalidCredentials => {
            HttpResponse::Unauthorized().json(ApiResponse::error("Invalid email/username or password"))
        }
        AuthError::DuplicateEmail => {
            HttpResponse::Conflict().json(ApiResponse::error("Email is already registered"))
        }
        other => {
            error!("{}: {}", context, other);
            HttpResponse::BadGateway().json(ApiResponse::error(format!("{} failed", context)))
        }
    }
}

pub fn upload_error(e: UploadError) -> HttpResponse {
    match e {
        UploadError::Storage(inner) => repo_error("storage upload", inner),
        UploadError::Persistence(inner) => repo_error("save soal", inner),
        local => bad_request(local.to_string()),
    }
}
