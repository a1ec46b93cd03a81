// src/handlers/profile_handlers.rs
use actix_web::{get, put, web, HttpResponse, Responder};
use log::info;

use crate::dtos::guru_dtos::UpdateProfileRequest;
use crate::handlers::common::{bad_request, repo_error, ApiResponse};
use crate::middleware::session_extractor::CurrentSession;
use crate::models::profile::ProfileChanges;
use crate::services::validation;
use crate::AppState;

/// GET /guru/profil
#[get("/guru/profil")]
pub async fn get_profile(session: CurrentSession, state: web::Data<AppState>) -> impl Responder {
    match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => HttpResponse::Ok().json(ApiResponse::success("Profile retrieved", auth.profile)),
        Err(resp) => resp,
    }
}

/// PUT /guru/profil
/// Only `nama` and `username` are editable; the role never is.
#[put("/guru/profil")]
pub async fn update_profile(
    session: CurrentSession,
    state: web::Data<AppState>,
    body: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    let auth = match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };

    let nama = body.nama.trim().to_string();
    let username = body.username.trim().to_lowercase();
    if nama.is_empty() {
        return bad_request("Nama is required");
    }
    if !validation::valid_username(&username) {
        return bad_request("Username must be 3-30 lowercase letters, digits, '_' or '.'");
    }

    let user_id = auth.profile.user_id;
    if username != auth.profile.username {
        match state.profiles.username_taken(&username, Some(user_id)).await {
            Ok(true) => {
                return HttpResponse::Conflict().json(ApiResponse::error("Username is already taken"));
            }
            Ok(false) => {}
            Err(e) => return repo_error("check username", e),
        }
    }

    let changes = ProfileChanges { nama, username };
    match state.profiles.update_own(&auth.token, user_id, &changes).await {
        Ok(updated) => {
            auth.store.refresh_profile(updated.clone());
            info!("profile {} updated", user_id);
            HttpResponse::Ok().json(ApiResponse::success("Profile updated", updated))
        }
        Err(e) => repo_error("update profile", e),
    }
}
