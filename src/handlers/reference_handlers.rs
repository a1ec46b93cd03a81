// src/handlers/reference_handlers.rs - admin CRUD over reference tables, read-only views for gurus
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use futures::future::try_join_all;
use log::info;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::handlers::common::{bad_request, repo_error, ApiResponse};
use crate::middleware::session_extractor::CurrentSession;
use crate::models::reference::ReferenceTable;
use crate::AppState;

/// Tables a guru picks tags from when uploading.
const TAGGING_TABLES: [ReferenceTable; 4] = [
    ReferenceTable::TahunAjaran,
    ReferenceTable::Mapel,
    ReferenceTable::Kelas,
    ReferenceTable::JenisUjian,
];

fn table_or_404(slug: &str) -> Result<ReferenceTable, HttpResponse> {
    ReferenceTable::from_slug(slug).ok_or_else(|| {
        HttpResponse::NotFound().json(ApiResponse::error(format!("Unknown table '{}'", slug)))
    })
}

/// GET /admin/{tabel}
#[get("/admin/{tabel}")]
pub async fn list_reference(
    session: CurrentSession,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let table = match table_or_404(&path) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.references.list(&auth.token, table).await {
        Ok(rows) => HttpResponse::Ok().json(ApiResponse::success("Data retrieved", rows)),
        Err(e) => repo_error(&format!("list {}", table.table_name()), e),
    }
}

/// POST /admin/{tabel}
#[post("/admin/{tabel}")]
pub async fn create_reference(
    session: CurrentSession,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let table = match table_or_404(&path) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let mut row = match table.validate_payload(body.into_inner()) {
        Ok(row) => row,
        Err(msg) => return bad_request(msg),
    };
    if table == ReferenceTable::Pengumuman {
        if let Some(obj) = row.as_object_mut() {
            obj.insert("created_by".into(), Value::String(auth.profile.user_id.to_string()));
        }
    }

    match state.references.insert(&auth.token, table, &row).await {
        Ok(saved) => {
            info!("admin {} created {} row", auth.profile.user_id, table.table_name());
            HttpResponse::Created().json(ApiResponse::success("Data saved", saved))
        }
        Err(e) => repo_error(&format!("create {}", table.table_name()), e),
    }
}

/// PUT /admin/{tabel}/{id}
#[put("/admin/{tabel}/{id}")]
pub async fn update_reference(
    session: CurrentSession,
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
    body: web::Json<Value>,
) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let (slug, id) = path.into_inner();
    let table = match table_or_404(&slug) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let row = match table.validate_payload(body.into_inner()) {
        Ok(row) => row,
        Err(msg) => return bad_request(msg),
    };

    match state.references.update(&auth.token, table, id, &row).await {
        Ok(saved) => HttpResponse::Ok().json(ApiResponse::success("Data updated", saved)),
        Err(e) => repo_error(&format!("update {}", table.table_name()), e),
    }
}

/// DELETE /admin/{tabel}/{id}
#[delete("/admin/{tabel}/{id}")]
pub async fn delete_reference(
    session: CurrentSession,
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
) -> impl Responder {
    let auth = match session.authorize(true, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let (slug, id) = path.into_inner();
    let table = match table_or_404(&slug) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.references.delete(&auth.token, table, id).await {
        Ok(deleted) => {
            info!("admin {} deleted {} {}", auth.profile.user_id, table.table_name(), id);
            HttpResponse::Ok().json(ApiResponse::success("Data deleted", deleted))
        }
        Err(e) => repo_error(&format!("delete {}", table.table_name()), e),
    }
}

/// GET /guru/referensi
/// Every tagging list in one call, keyed by table name.
#[get("/guru/referensi")]
pub async fn tagging_options(session: CurrentSession, state: web::Data<AppState>) -> impl Responder {
    let auth = match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };

    let lists = try_join_all(
        TAGGING_TABLES
            .iter()
            .map(|table| state.references.list(&auth.token, *table)),
    )
    .await;

    match lists {
        Ok(lists) => {
            let data: Map<String, Value> = TAGGING_TABLES
                .iter()
                .zip(lists)
                .map(|(table, rows)| (table.table_name().to_string(), Value::Array(rows)))
                .collect();
            HttpResponse::Ok().json(ApiResponse::success("Reference data", data))
        }
        Err(e) => repo_error("load reference data", e),
    }
}

/// GET /guru/pengumuman
#[get("/guru/pengumuman")]
pub async fn announcements(session: CurrentSession, state: web::Data<AppState>) -> impl Responder {
    let auth = match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };

    match state.references.list(&auth.token, ReferenceTable::Pengumuman).await {
        Ok(rows) => HttpResponse::Ok().json(ApiResponse::success("Pengumuman", rows)),
        Err(e) => repo_error("list pengumuman", e),
    }
}
