// src/handlers/guru_admin_handlers.rs - admin management of teacher accounts
use actix_web::{delete, get, post, web, HttpResponse, Responder};
use log::{info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::dtos::guru_dtos::CreateGuruRequest;
use crate::handlers::common::{auth_error, bad_request, repo_error, ApiResponse};
use crate::middleware::session_extractor::{Authorized, CurrentSession};
use crate::models::profile::Role;
use crate::repositories::supabase_rest::RepoError;
use crate::services::identity_provider::SignUpRequest;
use crate::services::validation;
use crate::AppState;

/// The menu gate is only a convenience; anything that uses the service-role
/// key asks the database again whether the caller is an admin.
async fn confirm_admin(state: &AppState, auth: &Authorized) -> Result<(), HttpResponse> {
    match state.profiles.has_role(&auth.token, auth.profile.user_id, Role::Admin).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!("user {} passed the menu gate but is not admin in the database", auth.profile.user_id);
            Err(HttpResponse::Forbidden().json(ApiResponse::error("Admin role required")))
        }
        Err(e) => Err(repo_error("check admin role", e)),
    }
}

/// GET /admin/guru
#[get("/admin/guru")]
pub async fn list_gurus(session: CurrentSession, state: web::Data<AppState>) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };

    match state.profiles.list_gurus(&auth.token).await {
        Ok(gurus) => HttpResponse::Ok().json(ApiResponse::success("Data guru", gurus)),
        Err(e) => repo_error("list guru", e),
    }
}

/// POST /admin/guru
/// Creates a confirmed `guru` account. Without an e-mail the login address
/// is derived from the username.
#[post("/admin/guru")]
pub async fn create_guru(
    session: CurrentSession,
    state: web::Data<AppState>,
    body: web::Json<CreateGuruRequest>,
) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };

    let username = body.username.trim().to_lowercase();
    let email = match body.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => email.to_lowercase(),
        None => format!("{}@{}", username, state.cfg.username_email_domain),
    };
    if let Err(msg) = validation::check_account_fields(&email, &body.password, &body.nama, &username) {
        return bad_request(msg);
    }

    if let Err(resp) = confirm_admin(&state, &auth).await {
        return resp;
    }
    match state.profiles.username_taken(&username, None).await {
        Ok(true) => {
            return HttpResponse::Conflict().json(ApiResponse::error("Username is already taken"));
        }
        Ok(false) => {}
        Err(e) => return repo_error("check username", e),
    }

    let request = SignUpRequest {
        email: email.clone(),
        password: body.password.clone(),
        nama: body.nama.trim().to_string(),
        username: username.clone(),
    };
    match state.admin.create_guru(&request).await {
        Ok(user_id) => {
            info!("admin {} created guru {} ({})", auth.profile.user_id, user_id, username);
            HttpResponse::Created().json(ApiResponse::success(
                "Guru account created",
                json!({ "user_id": user_id, "email": email, "username": username }),
            ))
        }
        Err(e) => auth_error("create guru", e),
    }
}

/// DELETE /admin/guru/{user_id}
/// Removes the identity, then cleans up its profile row. A failed identity
/// delete leaves the profile untouched so the account stays consistent.
/// Admin accounts are refused.
#[delete("/admin/guru/{user_id}")]
pub async fn delete_guru(
    session: CurrentSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let user_id = path.into_inner();
    if user_id == auth.profile.user_id {
        return bad_request("You cannot delete your own account");
    }

    if let Err(resp) = confirm_admin(&state, &auth).await {
        return resp;
    }
    match state.profiles.get_user_role(&auth.token, user_id).await {
        Ok(Some(Role::Guru)) => {}
        Ok(Some(Role::Admin)) => return bad_request("Admin accounts cannot be deleted here"),
        Ok(None) => return HttpResponse::NotFound().json(ApiResponse::error("Guru not found")),
        Err(e) => return repo_error("check guru role", e),
    }

    if let Err(e) = state.admin.delete_user(user_id).await {
        return auth_error("delete guru account", e);
    }
    // The profile usually goes with the identity (foreign key cascade); the
    // explicit delete covers schemas without one.
    match state.profiles.delete_by_user_id(&auth.token, user_id).await {
        Ok(_) | Err(RepoError::NotFound) => {}
        Err(e) => warn!("guru {} deleted but profile cleanup failed: {}", user_id, e),
    }

    info!("admin {} deleted guru {}", auth.profile.user_id, user_id);
    HttpResponse::Ok().json(ApiResponse::success("Guru deleted", json!({ "user_id": user_id })))
}
