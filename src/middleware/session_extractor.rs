// src/middleware/session_extractor.rs - browser session lookup and per-screen guard
use std::sync::Arc;
use std::time::Duration;

use actix_web::cookie::{Cookie, SameSite};
use actix_web::error::ErrorInternalServerError;
use actix_web::http::header;
use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest, HttpResponse};
use futures::future::{ready, Ready};
use log::{debug, warn};
use uuid::Uuid;

use crate::models::profile::Profile;
use crate::session::gate::RoleFlags;
use crate::session::guard::{GuardDecision, RouteGuard, LOGIN_PATH};
use crate::session::registry::SessionRegistry;
use crate::session::store::SessionStore;

pub const SESSION_COOKIE: &str = "sid";

/// The caller's Session Store, if the `sid` cookie names a live session.
pub struct CurrentSession {
    pub id: Option<Uuid>,
    pub store: Option<Arc<SessionStore>>,
    registry: web::Data<SessionRegistry>,
}

impl FromRequest for CurrentSession {
    type Error = Error;
    type Future = Ready<Result<CurrentSession, Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let registry = match req.app_data::<web::Data<SessionRegistry>>() {
            Some(r) => r.clone(),
            None => return ready(Err(ErrorInternalServerError("session registry not configured"))),
        };

        let id = req
            .cookie(SESSION_COOKIE)
            .and_then(|c| Uuid::parse_str(c.value()).ok());
        let store = id.and_then(|id| registry.get(&id));
        if id.is_some() && store.is_none() {
            debug!("stale session cookie");
        }

        ready(Ok(CurrentSession {
            id: store.as_ref().and(id),
            store,
            registry,
        }))
    }
}

/// A session the guard let through, with what handlers need to act for it.
pub struct Authorized {
    pub store: Arc<SessionStore>,
    pub profile: Profile,
    pub roles: RoleFlags,
    pub token: String,
}

impl CurrentSession {
    /// Reuse the caller's session or open a new one. The flag is true when
    /// the response has to set the cookie.
    pub fn get_or_create(&self) -> (Uuid, Arc<SessionStore>, bool) {
        match (self.id, &self.store) {
            (Some(id), Some(store)) => (id, store.clone(), false),
            _ => {
                let (id, store) = self.registry.create();
                (id, store, true)
            }
        }
    }

    /// Forget a session opened by `get_or_create` whose first call failed.
    pub fn discard(&self, id: Uuid) {
        self.registry.remove(&id);
    }

    /// Drop the session from the registry; returns its store if it existed.
    pub fn end(&self) -> Option<Arc<SessionStore>> {
        self.id.and_then(|id| self.registry.remove(&id))
    }

    /// Run the route guard for one protected screen. `Err` carries the
    /// response to send instead of the screen: a redirect or a placeholder.
    pub async fn authorize(&self, require_admin: bool, settle: Duration) -> Result<Authorized, HttpResponse> {
        let store = match &self.store {
            Some(store) => store.clone(),
            None => return Err(redirect(LOGIN_PATH)),
        };

        let state = store.settled(settle).await;
        match RouteGuard::new(require_admin).evaluate(&state) {
            GuardDecision::Loading => return Err(loading()),
            GuardDecision::Redirect(target) => return Err(redirect(target)),
            GuardDecision::Render => {}
        }
        let profile = match state.profile.clone() {
            Some(p) => p,
            None => return Err(redirect(LOGIN_PATH)),
        };

        let token = match store.access_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return Err(redirect(LOGIN_PATH)),
            Err(e) => {
                warn!("access token unavailable for {}: {}", profile.user_id, e);
                return Err(redirect(LOGIN_PATH));
            }
        };

        Ok(Authorized {
            store,
            roles: state.roles(),
            profile,
            token,
        })
    }
}

pub fn session_cookie(id: Uuid) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

pub fn redirect(target: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, target))
        .finish()
}

pub fn loading() -> HttpResponse {
    HttpResponse::Accepted()
        .insert_header((header::RETRY_AFTER, "1"))
        .json(serde_json::json!({
            "status": "loading",
            "message": "Session is still loading",
            "data": null,
        }))
}
