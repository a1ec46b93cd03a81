// src/main.rs
mod config;
mod dtos;
#[cfg(test)]
mod fake_supabase;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
mod session;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info};
use reqwest::Client;

use crate::config::AppConfig;
use crate::handlers::auth_handlers::{
    auth_screen, current_session, login, logout, signup, watch_screen,
};
use crate::handlers::dashboard_handlers::dashboard;
use crate::handlers::guru_admin_handlers::{create_guru, delete_guru, list_gurus};
use crate::handlers::profile_handlers::{get_profile, update_profile};
use crate::handlers::reference_handlers::{
    announcements, create_reference, delete_reference, list_reference, tagging_options,
    update_reference,
};
use crate::handlers::soal_handlers::{all_soal, delete_soal, my_soal, upload_soal};
use crate::repositories::profile_supabase_repo::{ProfileResolver, ProfileSupabaseRepo};
use crate::repositories::reference_repository::ReferenceRepository;
use crate::repositories::soal_repository::SoalRepository;
use crate::repositories::storage_repository::StorageRepository;
use crate::repositories::supabase_rest::SupabaseRest;
use crate::services::admin_services::AdminAuthService;
use crate::services::auth_services::SupabaseAuthClient;
use crate::session::registry::{SessionRegistry, StoreFactory};
use crate::session::store::{SessionStore, StoreOptions};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn mask_key(k: &str) -> String {
    if k.len() <= 8 { "[REDACTED]".to_string() }
    else { format!("{}***{}", &k[..4], &k[k.len()-4..]) }
}

/// Shared, per-process services. Per-browser auth state lives in the
/// `SessionRegistry` instead.
pub struct AppState {
    pub cfg: AppConfig,
    pub profiles: ProfileSupabaseRepo,
    pub references: ReferenceRepository,
    pub soal: SoalRepository,
    pub storage: StorageRepository,
    pub admin: AdminAuthService,
}

impl AppState {
    pub fn new(cfg: AppConfig, http_client: Client) -> Self {
        let rest = SupabaseRest::new(http_client.clone(), &cfg);
        Self {
            profiles: ProfileSupabaseRepo::new(rest.clone()),
            references: ReferenceRepository::new(rest.clone()),
            soal: SoalRepository::new(rest),
            storage: StorageRepository::new(http_client.clone(), &cfg),
            admin: AdminAuthService::new(http_client, &cfg),
            cfg,
        }
    }
}

/// Every browser session gets its own GoTrue client (it holds that
/// browser's tokens); the profile lookup is shared.
fn store_factory(cfg: &AppConfig, http_client: Client, resolver: Arc<dyn ProfileResolver>) -> StoreFactory {
    let cfg = cfg.clone();
    let options = StoreOptions::from(&cfg);
    Arc::new(move || {
        let provider = Arc::new(SupabaseAuthClient::new(http_client.clone(), &cfg));
        SessionStore::new(provider, resolver.clone(), options.clone())
    })
}

/// Route table. Fixed `/admin/...` paths go before `/admin/{tabel}`.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(auth_screen)            // GET /auth
        .service(login)                 // POST /auth/login
        .service(signup)                // POST /auth/signup
        .service(logout)                // POST /auth/logout
        .service(current_session)       // GET /auth/session
        .service(watch_screen)          // GET /auth/session/watch
        .service(dashboard)             // GET /
        .service(list_gurus)            // GET /admin/guru
        .service(create_guru)           // POST /admin/guru
        .service(delete_guru)           // DELETE /admin/guru/{user_id}
        .service(all_soal)              // GET /admin/soal
        .service(list_reference)        // GET /admin/{tabel}
        .service(create_reference)      // POST /admin/{tabel}
        .service(update_reference)      // PUT /admin/{tabel}/{id}
        .service(delete_reference)      // DELETE /admin/{tabel}/{id}
        .service(my_soal)               // GET /guru/soal
        .service(upload_soal)           // POST /guru/soal
        .service(delete_soal)           // DELETE /guru/soal/{id}
        .service(tagging_options)       // GET /guru/referensi
        .service(announcements)         // GET /guru/pengumuman
        .service(get_profile)           // GET /guru/profil
        .service(update_profile);       // PUT /guru/profil
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Supabase URL: {}", cfg.supabase_url);
    info!("Supabase anon key: {}", mask_key(&cfg.supabase_anon_key));
    info!("Supabase service key: {}", mask_key(&cfg.supabase_service_role_key));
    if cfg.supabase_jwt_secret.is_none() {
        info!("SUPABASE_JWT_SECRET not set, access tokens are decoded without signature checks");
    }

    let http_client = match Client::builder().user_agent("bank-soal-be/0.1").build() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build http client: {}", e);
            std::process::exit(1);
        }
    };

    let state = web::Data::new(AppState::new(cfg.clone(), http_client.clone()));
    let resolver: Arc<dyn ProfileResolver> = Arc::new(state.profiles.clone());
    let registry = web::Data::new(SessionRegistry::new(
        store_factory(&cfg, http_client, resolver),
        cfg.session_idle_ttl,
    ));

    let sweeper = registry.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            sweeper.sweep();
        }
    });

    let allowed_origins = cfg.allowed_origins.clone();
    let bind_address = format!("0.0.0.0:{}", cfg.port);
    info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                "authorization",
                "content-type",
                "accept",
                "x-requested-with",
            ])
            .supports_credentials()
            .max_age(3600);

        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(registry.clone())
            .app_data(web::JsonConfig::default().limit(state.cfg.max_upload_bytes * 4 / 3 + 64 * 1024))
            .configure(routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
