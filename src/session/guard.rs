// Per-screen access control derived from the session state.
use log::debug;
use tokio::sync::watch;

use crate::session::state::{Resolution, SessionState};

pub const LOGIN_PATH: &str = "/auth";
pub const LANDING_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unknown,
    Unauthenticated,
    AuthenticatedUnauthorized,
    AuthenticatedAuthorized,
}

/// What a protected screen should do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show a placeholder; never redirect before the session is settled.
    Loading,
    Redirect(&'static str),
    Render,
}

/// Failed resolutions count as unauthenticated so an errored session can
/// never reach a role-gated screen.
pub fn guard_state(session: &SessionState, require_admin: bool) -> GuardState {
    if session.loading {
        return GuardState::Unknown;
    }
    if session.identity.is_none() {
        return GuardState::Unauthenticated;
    }
    match (&session.resolution, &session.profile) {
        (Resolution::Found, Some(_)) => {
            if require_admin && !session.roles().is_admin {
                GuardState::AuthenticatedUnauthorized
            } else {
                GuardState::AuthenticatedAuthorized
            }
        }
        (Resolution::Failed(_), _) | (Resolution::Idle, _) => GuardState::Unauthenticated,
        // Pending, Missing, or a Found without a profile which the store never commits.
        _ => GuardState::Unknown,
    }
}

impl GuardState {
    pub fn decision(self) -> GuardDecision {
        match self {
            GuardState::Unknown => GuardDecision::Loading,
            GuardState::Unauthenticated => GuardDecision::Redirect(LOGIN_PATH),
            GuardState::AuthenticatedUnauthorized => GuardDecision::Redirect(LANDING_PATH),
            GuardState::AuthenticatedAuthorized => GuardDecision::Render,
        }
    }
}

/// Guard attached to one open screen. Re-evaluated on every session change;
/// reports a decision only when it differs from the previous one, so a
/// screen redirects at most once per transition.
#[derive(Debug)]
pub struct RouteGuard {
    require_admin: bool,
    last: Option<GuardDecision>,
}

impl RouteGuard {
    pub fn new(require_admin: bool) -> Self {
        Self { require_admin, last: None }
    }

    pub fn evaluate(&self, session: &SessionState) -> GuardDecision {
        guard_state(session, self.require_admin).decision()
    }

    pub fn observe(&mut self, session: &SessionState) -> Option<GuardDecision> {
        let decision = self.evaluate(session);
        if self.last == Some(decision) {
            return None;
        }
        self.last = Some(decision);
        Some(decision)
    }

    /// Follow the store until it goes away or the screen is redirected.
    /// Returns the redirect target, if any.
    pub async fn follow<F>(
        mut self,
        mut session: watch::Receiver<SessionState>,
        mut on_decision: F,
    ) -> Option<&'static str>
    where
        F: FnMut(GuardDecision),
    {
        loop {
            let decision = {
                let state = session.borrow_and_update();
                self.observe(&state)
            };
            if let Some(decision) = decision {
                on_decision(decision);
                if let GuardDecision::Redirect(target) = decision {
                    debug!("guard redirect to {}", target);
                    return Some(target);
                }
            }
            if session.changed().await.is_err() {
                return None;
            }
        }
    }
}
