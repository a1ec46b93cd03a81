// src/fake_supabase.rs - in-process stand-in for GoTrue, PostgREST and Storage
//
// Serves just enough of the three APIs for the real clients to run against
// it: `eq.` filters on tables, the two role RPCs, password/refresh grants
// with rotating refresh tokens, admin user create/delete and object
// upload/remove. Every request is counted by route so tests can assert what
// did (or did not) reach the backend.
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::AppConfig;

/// Knobs a test turns to make the backend misbehave.
pub struct Behavior {
    /// Lifetime of tokens from the password grant; refreshed tokens always live an hour.
    pub password_token_ttl: i64,
    pub refresh_delay: Duration,
    pub admin_delete_status: u16,
    /// Tables whose inserts are rejected the way row-level security does.
    pub failing_inserts: HashSet<String>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            password_token_ttl: 3600,
            refresh_delay: Duration::ZERO,
            admin_delete_status: 200,
            failing_inserts: HashSet::new(),
        }
    }
}

#[derive(Default)]
pub struct Backend {
    behavior: Mutex<Behavior>,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    /// email -> (password, user id)
    accounts: Mutex<HashMap<String, (String, Uuid)>>,
    /// live refresh token -> (user id, email)
    refresh_tokens: Mutex<HashMap<String, (Uuid, String)>>,
    created_users: Mutex<Vec<Value>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl Backend {
    pub fn behave(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.behavior.lock());
    }

    pub fn add_account(&self, email: &str, password: &str, user_id: Uuid) {
        self.accounts
            .lock()
            .insert(email.to_string(), (password.to_string(), user_id));
    }

    pub fn insert_row(&self, table: &str, row: Value) {
        self.tables.lock().entry(table.to_string()).or_default().push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Bodies sent to `POST /auth/v1/admin/users`.
    pub fn created_users(&self) -> Vec<Value> {
        self.created_users.lock().clone()
    }

    /// Requests seen for a route key such as `DELETE /rest/v1/profiles`.
    pub fn hits(&self, route: &str) -> usize {
        self.hits.lock().get(route).copied().unwrap_or(0)
    }

    fn record(&self, route: String) {
        *self.hits.lock().entry(route).or_default() += 1;
    }

    fn issue(&self, user_id: Uuid, email: &str, ttl: i64) -> HttpResponse {
        let claims = json!({
            "sub": user_id,
            "aud": "authenticated",
            "exp": Utc::now().timestamp() + ttl,
            "email": email,
            "role": "authenticated",
        });
        let access_token = match encode(&Header::default(), &claims, &EncodingKey::from_secret(b"fake")) {
            Ok(token) => token,
            Err(e) => return HttpResponse::InternalServerError().json(json!({ "msg": e.to_string() })),
        };
        let refresh_token = Uuid::new_v4().to_string();
        self.refresh_tokens
            .lock()
            .insert(refresh_token.clone(), (user_id, email.to_string()));

        HttpResponse::Ok().json(json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": ttl,
            "refresh_token": refresh_token,
            "user": { "id": user_id, "email": email },
        }))
    }

    async fn auth(&self, method: &str, rest: &str, query: &HashMap<String, String>, body: Value) -> HttpResponse {
        match (method, rest) {
            ("POST", "token") => match query.get("grant_type").map(String::as_str) {
                Some("password") => self.password_grant(&body),
                Some("refresh_token") => {
                    let delay = self.behavior.lock().refresh_delay;
                    tokio::time::sleep(delay).await;
                    self.refresh_grant(&body)
                }
                _ => HttpResponse::BadRequest().json(json!({ "error": "unsupported_grant_type" })),
            },
            ("POST", "logout") => HttpResponse::NoContent().finish(),
            ("POST", "admin/users") => {
                let email = body["email"].clone();
                self.created_users.lock().push(body);
                HttpResponse::Ok().json(json!({ "id": Uuid::new_v4(), "email": email }))
            }
            ("DELETE", path) if path.starts_with("admin/users/") => {
                let status = self.behavior.lock().admin_delete_status;
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_success() {
                    HttpResponse::build(status).json(json!({}))
                } else {
                    HttpResponse::build(status).json(json!({ "msg": "admin api unavailable" }))
                }
            }
            _ => HttpResponse::NotFound().finish(),
        }
    }

    fn password_grant(&self, body: &Value) -> HttpResponse {
        let email = body["email"].as_str().unwrap_or_default();
        let password = body["password"].as_str().unwrap_or_default();
        let account = self.accounts.lock().get(email).cloned();
        match account {
            Some((expected, user_id)) if expected == password => {
                let ttl = self.behavior.lock().password_token_ttl;
                self.issue(user_id, email, ttl)
            }
            _ => HttpResponse::BadRequest().json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials",
            })),
        }
    }

    /// Refresh tokens are single use, like GoTrue with rotation enabled.
    fn refresh_grant(&self, body: &Value) -> HttpResponse {
        let token = body["refresh_token"].as_str().unwrap_or_default();
        let owner = self.refresh_tokens.lock().remove(token);
        match owner {
            Some((user_id, email)) => self.issue(user_id, &email, 3600),
            None => HttpResponse::BadRequest().json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid Refresh Token: Already Used",
            })),
        }
    }

    fn rpc(&self, function: &str, args: &Value) -> HttpResponse {
        let user_id = args["_user_id"].as_str().unwrap_or_default();
        let tables = self.tables.lock();
        let profile = tables
            .get("profiles")
            .and_then(|rows| rows.iter().find(|row| row["user_id"].as_str() == Some(user_id)));
        match function {
            "has_role" => {
                let holds = profile.is_some_and(|row| row["role"] == args["_role"]);
                HttpResponse::Ok().json(holds)
            }
            "get_user_role" => HttpResponse::Ok().json(profile.map(|row| row["role"].clone())),
            _ => HttpResponse::NotFound().json(json!({ "message": "function not found" })),
        }
    }

    fn table(&self, method: &str, table: &str, query: &HashMap<String, String>, body: Value) -> HttpResponse {
        let filters: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(column, value)| value.strip_prefix("eq.").map(|v| (column.as_str(), v)))
            .collect();
        let matches = |row: &Value| {
            filters.iter().all(|(column, value)| match &row[*column] {
                Value::String(s) => s == value,
                Value::Null => false,
                other => other.to_string() == *value,
            })
        };

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();
        match method {
            "GET" => {
                let found: Vec<Value> = rows.iter().filter(|row| matches(*row)).cloned().collect();
                HttpResponse::Ok().json(found)
            }
            "POST" => {
                if self.behavior.lock().failing_inserts.contains(table) {
                    return HttpResponse::Forbidden().json(json!({
                        "code": "42501",
                        "message": "new row violates row-level security policy",
                    }));
                }
                let mut row = body;
                if let Some(fields) = row.as_object_mut() {
                    fields.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
                    fields.entry("created_at").or_insert_with(|| json!(Utc::now()));
                }
                rows.push(row.clone());
                HttpResponse::Created().json(vec![row])
            }
            "PATCH" => {
                let mut updated = Vec::new();
                for row in rows.iter_mut().filter(|row| matches(&**row)) {
                    if let (Some(fields), Some(changes)) = (row.as_object_mut(), body.as_object()) {
                        for (k, v) in changes {
                            fields.insert(k.clone(), v.clone());
                        }
                    }
                    updated.push(row.clone());
                }
                HttpResponse::Ok().json(updated)
            }
            "DELETE" => {
                let (removed, kept): (Vec<Value>, Vec<Value>) = rows.drain(..).partition(|row| matches(row));
                *rows = kept;
                HttpResponse::Ok().json(removed)
            }
            _ => HttpResponse::MethodNotAllowed().finish(),
        }
    }
}

/// `METHOD /path`, with per-object paths collapsed so tests can count them.
fn route_key(method: &str, path: &str, query: &str) -> String {
    if let Some(rest) = path.strip_prefix("/storage/v1/object/") {
        if let Some((bucket, _)) = rest.split_once('/') {
            return format!("{} /storage/v1/object/{}/*", method, bucket);
        }
    }
    if path.starts_with("/auth/v1/admin/users/") {
        return format!("{} /auth/v1/admin/users/*", method);
    }
    if path == "/auth/v1/token" {
        return format!("{} {}?{}", method, path, query);
    }
    format!("{} {}", method, path)
}

async fn dispatch(req: HttpRequest, body: web::Bytes, backend: web::Data<Backend>) -> HttpResponse {
    let method = req.method().as_str().to_string();
    let path = req.path().to_string();
    backend.record(route_key(&method, &path, req.query_string()));

    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(|q| q.into_inner())
        .unwrap_or_default();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    if let Some(rest) = path.strip_prefix("/auth/v1/") {
        return backend.auth(&method, rest, &query, body).await;
    }
    if let Some(function) = path.strip_prefix("/rest/v1/rpc/") {
        return backend.rpc(function, &body);
    }
    if let Some(table) = path.strip_prefix("/rest/v1/") {
        return backend.table(&method, table, &query, body);
    }
    if path.starts_with("/storage/v1/object/") {
        return HttpResponse::Ok().json(json!({ "Key": path }));
    }
    HttpResponse::NotFound().finish()
}

/// The fake running on an ephemeral local port.
pub struct FakeSupabase {
    pub backend: web::Data<Backend>,
    url: String,
    handle: ServerHandle,
}

impl FakeSupabase {
    pub async fn start() -> Self {
        let backend = web::Data::new(Backend::default());
        let data = backend.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .app_data(web::PayloadConfig::new(4 * 1024 * 1024))
                .default_service(web::to(dispatch))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .expect("failed to bind ephemeral port");

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self { backend, url: format!("http://{}", addr), handle }
    }

    /// Test config with every Supabase URL pointing here.
    pub fn config(&self) -> AppConfig {
        AppConfig { supabase_url: self.url.clone(), ..AppConfig::for_tests() }
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

mod tests {
    use super::*;

    #[test]
    fn object_routes_collapse_per_bucket() {
        assert_eq!(
            route_key("POST", "/storage/v1/object/soal/abc/1_uts.pdf", ""),
            "POST /storage/v1/object/soal/*"
        );
        assert_eq!(route_key("DELETE", "/storage/v1/object/soal", ""), "DELETE /storage/v1/object/soal");
        assert_eq!(
            route_key("POST", "/auth/v1/token", "grant_type=refresh_token"),
            "POST /auth/v1/token?grant_type=refresh_token"
        );
    }
}
