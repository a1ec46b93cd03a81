// src/handlers/soal_handlers.rs - exam file uploads
use actix_web::{delete, get, post, web, HttpResponse, Responder};
use uuid::Uuid;

use crate::dtos::soal_dtos::UploadSoalRequest;
use crate::handlers::common::{bad_request, repo_error, upload_error, ApiResponse};
use crate::middleware::session_extractor::CurrentSession;
use crate::repositories::soal_repository::SoalFilter;
use crate::services::upload_service;
use crate::AppState;

/// GET /guru/soal?mapel_id=..
#[get("/guru/soal")]
pub async fn my_soal(
    session: CurrentSession,
    state: web::Data<AppState>,
    filter: web::Query<SoalFilter>,
) -> impl Responder {
    let auth = match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };

    match state
        .soal
        .list_for_guru(&auth.token, auth.profile.user_id, &filter)
        .await
    {
        Ok(rows) => HttpResponse::Ok().json(ApiResponse::success("Soal saya", rows)),
        Err(e) => repo_error("list soal", e),
    }
}

/// POST /guru/soal
/// Type and size are checked before anything is sent to storage.
#[post("/guru/soal")]
pub async fn upload_soal(
    session: CurrentSession,
    state: web::Data<AppState>,
    body: web::Json<UploadSoalRequest>,
) -> impl Responder {
    let auth = match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    if body.judul.trim().is_empty() {
        return bad_request("Judul is required");
    }

    let file = match upload_service::prepare_file(&body, state.cfg.max_upload_bytes) {
        Ok(file) => file,
        Err(e) => return upload_error(e),
    };

    match upload_service::store_soal(
        &state.storage,
        &state.soal,
        &auth.token,
        auth.profile.user_id,
        &body,
        file,
    )
    .await
    {
        Ok(saved) => HttpResponse::Created().json(ApiResponse::success("Soal uploaded", saved)),
        Err(e) => upload_error(e),
    }
}

/// DELETE /guru/soal/{id}
#[delete("/guru/soal/{id}")]
pub async fn delete_soal(
    session: CurrentSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    let auth = match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let id = path.into_inner();

    // Row-level security hides other teachers' rows; this gives a clean 404/403.
    match state.soal.get(&auth.token, id).await {
        Ok(row) if row.guru_id != auth.profile.user_id && !auth.roles.is_admin => {
            return HttpResponse::Forbidden().json(ApiResponse::error("Not your upload"));
        }
        Ok(_) => {}
        Err(e) => return repo_error("load soal", e),
    }

    match upload_service::delete_soal(&state.storage, &state.soal, &auth.token, id).await {
        Ok(deleted) => HttpResponse::Ok().json(ApiResponse::success("Soal deleted", deleted)),
        Err(e) => upload_error(e),
    }
}

/// GET /admin/soal
#[get("/admin/soal")]
pub async fn all_soal(
    session: CurrentSession,
    state: web::Data<AppState>,
    filter: web::Query<SoalFilter>,
) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };

    match state.soal.list_all(&auth.token, &filter).await {
        Ok(rows) => HttpResponse::Ok().json(ApiResponse::success("Semua soal", rows)),
        Err(e) => repo_error("list all soal", e),
    }
}
