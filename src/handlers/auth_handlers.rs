// src/handlers/auth_handlers.rs - login screen, sign-in/up/out and session readout
use actix_web::{get, post, web, HttpResponse, Responder};
use log::{debug, info};

use crate::dtos::auth::{LoginIn, ScreenQuery, SessionOut, SignupIn};
use crate::handlers::common::{auth_error, ApiResponse};
use crate::middleware::session_extractor::{
    redirect, removal_cookie, session_cookie, CurrentSession,
};
use crate::services::identity_provider::SignUpOutcome;
use crate::services::validation;
use crate::session::guard::{guard_state, GuardState, RouteGuard, LANDING_PATH, LOGIN_PATH};
use crate::session::state::SessionState;
use crate::AppState;

fn signed_in_as(state: &SessionState, email: Option<&str>) -> bool {
    match (&state.identity, email) {
        (Some(identity), Some(email)) => identity.email.eq_ignore_ascii_case(email),
        _ => false,
    }
}

/// GET /auth
/// Login/registration screen. A fully signed-in session is sent home.
#[get("/auth")]
pub async fn auth_screen(session: CurrentSession, state: web::Data<AppState>) -> impl Responder {
    let current = match &session.store {
        Some(store) => store.settled(state.cfg.guard_settle_timeout).await,
        None => SessionState { loading: false, ..SessionState::initial() },
    };
    if guard_state(&current, false) == GuardState::AuthenticatedAuthorized {
        return redirect(LANDING_PATH);
    }
    HttpResponse::Ok().json(ApiResponse::success(
        "Sign in with email or username",
        SessionOut::from(&current),
    ))
}

/// POST /auth/login
/// `login` is an e-mail or a username.
#[post("/auth/login")]
pub async fn login(
    session: CurrentSession,
    state: web::Data<AppState>,
    body: web::Json<LoginIn>,
) -> impl Responder {
    let (id, store, fresh) = session.get_or_create();

    if let Err(e) = store.sign_in(&body.login, &body.password).await {
        if fresh {
            session.discard(id);
        }
        return auth_error("login", e);
    }

    let expected = validation::login_email(&body.login, &state.cfg.username_email_domain);
    let current = store
        .wait_for(state.cfg.guard_settle_timeout, |s| signed_in_as(s, expected.as_deref()))
        .await;
    info!("session {} signed in", id);

    let mut resp = HttpResponse::Ok();
    if fresh {
        resp.cookie(session_cookie(id));
    }
    resp.json(ApiResponse::success("Login successful", SessionOut::from(&current)))
}

/// POST /auth/signup
/// Self-registration always creates a `guru`; the profile row is provisioned
/// by the database and shows up in the session once it exists.
#[post("/auth/signup")]
pub async fn signup(
    session: CurrentSession,
    state: web::Data<AppState>,
    body: web::Json<SignupIn>,
) -> impl Responder {
    let (id, store, fresh) = session.get_or_create();

    let outcome = match store
        .sign_up(&body.email, &body.password, &body.nama, &body.username)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            if fresh {
                session.discard(id);
            }
            return auth_error("signup", e);
        }
    };

    match outcome {
        SignUpOutcome::SignedIn => {
            let email = body.email.trim().to_lowercase();
            let current = store
                .wait_for(state.cfg.guard_settle_timeout, |s| signed_in_as(s, Some(&email)))
                .await;
            info!("session {} registered a new guru", id);

            let mut resp = HttpResponse::Created();
            if fresh {
                resp.cookie(session_cookie(id));
            }
            resp.json(ApiResponse::success("Registration successful", SessionOut::from(&current)))
        }
        SignUpOutcome::ConfirmationRequired => {
            if fresh {
                session.discard(id);
            }
            HttpResponse::Accepted().json(ApiResponse::<()> {
                status: "success".to_string(),
                message: "Registration successful, confirm your email before signing in".to_string(),
                data: None,
            })
        }
    }
}

/// POST /auth/logout
/// Always succeeds locally, whatever the identity provider answers.
#[post("/auth/logout")]
pub async fn logout(session: CurrentSession) -> impl Responder {
    if let Some(store) = &session.store {
        store.sign_out().await;
    }
    session.end();

    HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(ApiResponse::<()> {
            status: "success".to_string(),
            message: "Signed out".to_string(),
            data: None,
        })
}

/// GET /auth/session
/// Current session as the client shell sees it; polled while loading.
#[get("/auth/session")]
pub async fn current_session(session: CurrentSession) -> impl Responder {
    let current = match &session.store {
        Some(store) => store.snapshot(),
        None => SessionState { loading: false, ..SessionState::initial() },
    };
    HttpResponse::Ok().json(ApiResponse::success("Session", SessionOut::from(&current)))
}

/// GET /auth/session/watch?screen=/admin/kelas
/// Long-poll for an open screen. Answers `303` with the redirect as soon as
/// the session stops allowing the screen (sign-out elsewhere, failed profile),
/// or `204` when nothing changed before the poll timed out.
#[get("/auth/session/watch")]
pub async fn watch_screen(
    session: CurrentSession,
    state: web::Data<AppState>,
    query: web::Query<ScreenQuery>,
) -> impl Responder {
    let Some(store) = &session.store else {
        return redirect(LOGIN_PATH);
    };

    let screen = query.screen.as_str();
    let guard = RouteGuard::new(screen.starts_with("/admin"));
    let follow = guard.follow(store.subscribe(), |decision| {
        debug!("screen {} guard: {:?}", screen, decision);
    });
    match tokio::time::timeout(state.cfg.guard_watch_timeout, follow).await {
        Ok(Some(target)) => redirect(target),
        Ok(None) | Err(_) => HttpResponse::NoContent().finish(),
    }
}
