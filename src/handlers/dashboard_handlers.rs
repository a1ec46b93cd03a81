use actix_web::{get, web, HttpResponse, Responder};

use crate::dtos::auth::SessionOut;
use crate::handlers::common::ApiResponse;
use crate::middleware::session_extractor::CurrentSession;
use crate::AppState;

/// GET /
/// Landing screen for every signed-in role: profile, flags and menu.
#[get("/")]
pub async fn dashboard(session: CurrentSession, state: web::Data<AppState>) -> impl Responder {
    let auth = match session.authorize(false, state.cfg.guard_settle_timeout).await {
        Ok(auth) => auth,
        Err(resp) => return resp,
    };
    let message = format!("Selamat datang, {}", auth.profile.nama);
    HttpResponse::Ok().json(ApiResponse::success(&message, SessionOut::from(&auth.store.snapshot())))
}
