// Session Store: the single writer of one browser session's auth state.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::models::profile::Profile;
use crate::models::user::Identity;
use crate::repositories::profile_supabase_repo::ProfileResolver;
use crate::services::identity_provider::{
    AuthChange, AuthError, AuthEvent, IdentityProvider, SignUpOutcome, SignUpRequest,
};
use crate::services::validation;
use crate::session::guard::{guard_state, GuardState};
use crate::session::state::{Resolution, SessionState};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub username_email_domain: String,
    pub profile_retry_attempts: u32,
    pub profile_retry_delay: Duration,
    pub sign_out_timeout: Duration,
}

impl From<&AppConfig> for StoreOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            username_email_domain: cfg.username_email_domain.clone(),
            profile_retry_attempts: cfg.profile_retry_attempts,
            profile_retry_delay: cfg.profile_retry_delay,
            sign_out_timeout: cfg.sign_out_timeout,
        }
    }
}

/// Tag of an in-flight resolution. A result is committed only while the
/// store's current ticket is still this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    user_id: uuid::Uuid,
}

enum Outcome {
    Found(Profile),
    Missing,
    Failed(String),
}

pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    resolver: Arc<dyn ProfileResolver>,
    options: StoreOptions,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    current: Mutex<Option<Ticket>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn ProfileResolver>,
        options: StoreOptions,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::initial());
        Arc::new(Self {
            provider,
            resolver,
            options,
            state,
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            listener: Mutex::new(None),
        })
    }

    /// Subscribe to the provider's change stream. Calling it again while a
    /// subscription is live does nothing.
    pub fn initialize(self: &Arc<Self>) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            debug!("session store already initialized");
            return;
        }

        let mut changes = self.provider.on_auth_state_change();
        let store: Weak<Self> = Arc::downgrade(self);
        *listener = Some(tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => match store.upgrade() {
                        Some(store) => store.apply(change),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("session store lagged, {} identity events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Unsubscribe from the change stream. Pending resolutions are left to
    /// finish but can no longer reach a dropped store.
    pub fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
            debug!("session store unsubscribed");
        }
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Wait until the session is no longer in the guard's `Unknown` state,
    /// or the timeout passes; returns the state seen last.
    pub async fn settled(&self, timeout: Duration) -> SessionState {
        self.wait_for(timeout, |_| true).await
    }

    /// Like `settled`, but also requires `pred` to hold. Used after a
    /// sign-in, whose identity event lands on the listener task later.
    pub async fn wait_for<F>(&self, timeout: Duration, pred: F) -> SessionState
    where
        F: Fn(&SessionState) -> bool,
    {
        let mut rx = self.subscribe();
        let wait = async {
            rx.wait_for(|s| pred(s) && guard_state(s, false) != GuardState::Unknown)
                .await
                .map(|s| s.clone())
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => state,
            _ => self.snapshot(),
        }
    }

    pub async fn sign_in(&self, email_or_username: &str, password: &str) -> Result<(), AuthError> {
        let email = validation::login_email(email_or_username, &self.options.username_email_domain)
            .ok_or_else(|| AuthError::Validation("Enter a valid email or username".to_string()))?;
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }
        self.provider.sign_in(&email, password).await
    }

    /// Register a teacher account. The profile row appears asynchronously.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        nama: &str,
        username: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        let email = email.trim().to_lowercase();
        let username = username.trim().to_lowercase();
        validation::check_account_fields(&email, password, nama, &username)
            .map_err(AuthError::Validation)?;

        let request = SignUpRequest {
            email,
            password: password.to_string(),
            nama: nama.trim().to_string(),
            username,
        };
        self.provider.sign_up(&request).await
    }

    /// Local state is cleared before the provider is contacted, so an
    /// unreachable provider cannot keep the session alive.
    pub async fn sign_out(&self) {
        self.clear();
        match tokio::time::timeout(self.options.sign_out_timeout, self.provider.sign_out()).await {
            Ok(Ok(())) => info!("signed out"),
            Ok(Err(e)) => warn!("remote sign-out failed, local session cleared anyway: {}", e),
            Err(_) => warn!("remote sign-out timed out, local session cleared anyway"),
        }
    }

    pub async fn access_token(&self) -> Result<Option<String>, AuthError> {
        self.provider.access_token().await
    }

    /// Replace the committed profile after the user edited it. Ignored when
    /// the session has moved on to another identity or is still resolving.
    pub fn refresh_profile(&self, profile: Profile) -> bool {
        let _current = self.current.lock();
        self.state.send_if_modified(|s| {
            let same_user = s.identity.as_ref().is_some_and(|i| i.id == profile.user_id);
            if same_user && s.resolution == Resolution::Found {
                s.profile = Some(profile);
                true
            } else {
                false
            }
        })
    }

    fn clear(&self) {
        let mut current = self.current.lock();
        *current = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|s| {
            s.identity = None;
            s.profile = None;
            s.loading = false;
            s.resolution = Resolution::Idle;
        });
    }

    /// Apply one provider event. Called from the listener task only, in
    /// the order events were received.
    fn apply(self: &Arc<Self>, change: AuthChange) {
        debug!("auth event {:?}", change.event);
        let (current_id, failed) = {
            let s = self.state.borrow();
            (
                s.identity.as_ref().map(|i| i.id),
                matches!(s.resolution, Resolution::Failed(_)),
            )
        };
        let next_id = change.identity.as_ref().map(|i| i.id);

        let retry_failed = failed && change.event == AuthEvent::SignedIn;
        if current_id == next_id && !retry_failed {
            self.state.send_modify(|s| {
                s.loading = false;
                if change.identity.is_some() {
                    s.identity = change.identity;
                }
            });
            return;
        }

        match change.identity {
            None => self.clear(),
            Some(identity) => {
                let ticket = {
                    let mut current = self.current.lock();
                    let ticket = Ticket {
                        generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
                        user_id: identity.id,
                    };
                    *current = Some(ticket);
                    self.state.send_modify(|s| {
                        s.identity = Some(identity.clone());
                        s.profile = None;
                        s.loading = false;
                        s.resolution = Resolution::Pending;
                    });
                    ticket
                };
                self.spawn_resolution(ticket, identity);
            }
        }
    }

    fn spawn_resolution(self: &Arc<Self>, ticket: Ticket, identity: Identity) {
        let store = Arc::downgrade(self);
        let resolver = self.resolver.clone();
        let attempts = self.options.profile_retry_attempts;
        let delay = self.options.profile_retry_delay;

        tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                let result = resolver.resolve(&identity).await;
                let Some(store) = store.upgrade() else { return };
                let outcome = match result {
                    Ok(Some(profile)) => Outcome::Found(profile),
                    Ok(None) if attempt < attempts => Outcome::Missing,
                    Ok(None) => Outcome::Failed("profile not provisioned".to_string()),
                    Err(e) => {
                        warn!("profile resolution for {} failed: {}", identity.id, e);
                        Outcome::Failed(e.0)
                    }
                };
                let retry = matches!(outcome, Outcome::Missing);
                if !store.commit(ticket, outcome) || !retry {
                    return;
                }
                drop(store);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        });
    }

    /// Commit a resolution result if its ticket is still current.
    fn commit(&self, ticket: Ticket, outcome: Outcome) -> bool {
        let current = self.current.lock();
        let identity_matches = self
            .state
            .borrow()
            .identity
            .as_ref()
            .is_some_and(|i| i.id == ticket.user_id);
        if *current != Some(ticket) || !identity_matches {
            debug!("discarding stale resolution for {}", ticket.user_id);
            return false;
        }

        self.state.send_modify(|s| match outcome {
            Outcome::Found(profile) => {
                s.profile = Some(profile);
                s.resolution = Resolution::Found;
            }
            Outcome::Missing => {
                s.profile = None;
                s.resolution = Resolution::Missing;
            }
            Outcome::Failed(reason) => {
                s.profile = None;
                s.resolution = Resolution::Failed(reason);
            }
        });
        true
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::Role;
    use crate::session::guard::GuardDecision;
    use crate::session::guard::RouteGuard;
    use crate::session::testing::{
        identity, test_options, wait_until, FakeProvider, FakeResolver, SignOutBehavior,
    };

    fn store_with(provider: &Arc<FakeProvider>, resolver: &Arc<FakeResolver>) -> Arc<SessionStore> {
        let store = SessionStore::new(provider.clone(), resolver.clone(), test_options());
        store.initialize();
        store
    }

    #[tokio::test]
    async fn first_event_ends_loading() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let store = SessionStore::new(provider.clone(), resolver.clone(), test_options());
        assert!(store.snapshot().loading);

        store.initialize();
        let state = wait_until(&store, |s| !s.loading).await;
        assert!(state.identity.is_none());
        assert_eq!(state.resolution, Resolution::Idle);
    }

    #[tokio::test]
    async fn initialize_twice_keeps_one_subscription() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let store = store_with(&provider, &resolver);
        store.initialize();
        store.initialize();
        assert_eq!(provider.subscriptions(), 1);
        assert_eq!(provider.receiver_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_unsubscribes() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let store = store_with(&provider, &resolver);
        wait_until(&store, |s| !s.loading).await;

        store.shutdown();
        assert!(!store.is_initialized());
        wait_for_receivers(&provider, 0).await;

        // A fresh initialize after shutdown subscribes again.
        store.initialize();
        assert_eq!(provider.subscriptions(), 2);
    }

    #[tokio::test]
    async fn dropping_the_store_releases_the_subscription() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let store = store_with(&provider, &resolver);
        wait_until(&store, |s| !s.loading).await;
        drop(store);
        wait_for_receivers(&provider, 0).await;
    }

    async fn wait_for_receivers(provider: &FakeProvider, n: usize) {
        for _ in 0..100 {
            if provider.receiver_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} receivers, got {}", n, provider.receiver_count());
    }

    #[tokio::test]
    async fn roles_stay_closed_while_resolving() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let admin = identity();
        resolver.insert(Profile::sample(admin.id, Role::Admin));
        let gate = resolver.gate(admin.id);
        provider.add_account("admin@x.com", "secret1", admin.clone());

        let store = store_with(&provider, &resolver);
        store.sign_in("admin@x.com", "secret1").await.unwrap();

        let state = wait_until(&store, |s| s.identity.is_some()).await;
        assert_eq!(state.resolution, Resolution::Pending);
        assert!(!state.roles().is_admin && !state.roles().is_guru);
        assert_eq!(RouteGuard::new(true).evaluate(&state), GuardDecision::Loading);

        gate.notify_one();
        let state = wait_until(&store, |s| s.resolution == Resolution::Found).await;
        assert!(state.roles().is_admin);
    }

    #[tokio::test]
    async fn later_identity_wins_over_slow_earlier_fetch() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let (a, b) = (identity(), identity());
        resolver.insert(Profile::sample(a.id, Role::Admin));
        resolver.insert(Profile::sample(b.id, Role::Guru));
        let gate_a = resolver.gate(a.id);

        let store = store_with(&provider, &resolver);
        wait_until(&store, |s| !s.loading).await;

        provider.emit(AuthEvent::SignedIn, Some(a.clone()));
        provider.emit(AuthEvent::SignedIn, Some(b.clone()));

        let state = wait_until(&store, |s| s.resolution == Resolution::Found).await;
        assert_eq!(state.profile.as_ref().unwrap().user_id, b.id);

        // A's fetch lands late and must be ignored.
        gate_a.notify_one();
        wait_for_calls(&resolver, a.id, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = store.snapshot();
        assert_eq!(state.identity.as_ref().unwrap().id, b.id);
        assert_eq!(state.profile.as_ref().unwrap().user_id, b.id);
        assert!(state.roles().is_guru && !state.roles().is_admin);
    }

    async fn wait_for_calls(resolver: &FakeResolver, user: uuid::Uuid, n: usize) {
        for _ in 0..100 {
            if resolver.completed(user) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("resolver never completed for {}", user);
    }

    #[tokio::test]
    async fn returning_to_an_earlier_identity_uses_a_fresh_ticket() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let (a, b) = (identity(), identity());
        resolver.insert(Profile::sample(a.id, Role::Guru));
        resolver.insert(Profile::sample(b.id, Role::Guru));
        let gate_a = resolver.gate(a.id);

        let store = store_with(&provider, &resolver);
        provider.emit(AuthEvent::SignedIn, Some(a.clone()));
        provider.emit(AuthEvent::SignedIn, Some(b.clone()));
        provider.emit(AuthEvent::SignedIn, Some(a.clone()));

        // Both fetches for `a` wait on the same gate; release both.
        gate_a.notify_one();
        wait_for_calls(&resolver, a.id, 1).await;
        gate_a.notify_one();

        let state = wait_until(&store, |s| s.resolution == Resolution::Found).await;
        assert_eq!(state.identity.as_ref().unwrap().id, a.id);
        assert_eq!(state.profile.as_ref().unwrap().user_id, a.id);
    }

    #[tokio::test]
    async fn backend_failure_is_distinct_from_missing_profile() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let down = identity();
        resolver.fail(down.id, "connection refused");

        let store = store_with(&provider, &resolver);
        provider.emit(AuthEvent::SignedIn, Some(down.clone()));

        let state = wait_until(&store, |s| matches!(s.resolution, Resolution::Failed(_))).await;
        assert_eq!(state.resolution, Resolution::Failed("connection refused".into()));
        assert_eq!(RouteGuard::new(false).evaluate(&state), GuardDecision::Redirect("/auth"));
    }

    #[tokio::test]
    async fn profile_that_never_appears_ends_failed() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let orphan = identity();

        let store = store_with(&provider, &resolver);
        provider.emit(AuthEvent::SignedIn, Some(orphan.clone()));

        let state = wait_until(&store, |s| s.resolution == Resolution::Missing).await;
        assert_eq!(RouteGuard::new(false).evaluate(&state), GuardDecision::Loading);

        let state = wait_until(&store, |s| matches!(s.resolution, Resolution::Failed(_))).await;
        assert!(state.profile.is_none());
        assert_eq!(resolver.completed(orphan.id), test_options().profile_retry_attempts as usize + 1);
    }

    #[tokio::test]
    async fn token_refresh_does_not_re_resolve() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let guru = identity();
        resolver.insert(Profile::sample(guru.id, Role::Guru));

        let store = store_with(&provider, &resolver);
        provider.emit(AuthEvent::SignedIn, Some(guru.clone()));
        wait_until(&store, |s| s.resolution == Resolution::Found).await;

        provider.emit(AuthEvent::TokenRefreshed, Some(guru.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resolver.completed(guru.id), 1);
        assert_eq!(store.snapshot().resolution, Resolution::Found);
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_state_untouched() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        provider.add_account("t@x.com", "abc123", identity());

        let store = store_with(&provider, &resolver);
        let before = wait_until(&store, |s| !s.loading).await;

        let err = store.sign_in("t@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(store.snapshot(), before);

        let err = store.sign_in("   ", "abc123").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(provider.sign_in_calls(), 1);
    }

    #[tokio::test]
    async fn username_login_maps_to_domain_email() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let guru = identity();
        provider.add_account("budi@guru.local", "abc123", guru.clone());

        let store = store_with(&provider, &resolver);
        store.sign_in("Budi", "abc123").await.unwrap();
        let state = wait_until(&store, |s| s.identity.is_some()).await;
        assert_eq!(state.identity.unwrap().id, guru.id);
    }

    #[tokio::test]
    async fn sign_out_clears_state_even_when_provider_hangs() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let guru = identity();
        resolver.insert(Profile::sample(guru.id, Role::Guru));
        provider.set_sign_out(SignOutBehavior::Hang);

        let store = store_with(&provider, &resolver);
        provider.emit(AuthEvent::SignedIn, Some(guru.clone()));
        wait_until(&store, |s| s.resolution == Resolution::Found).await;

        store.sign_out().await;
        let state = store.snapshot();
        assert!(state.identity.is_none() && state.profile.is_none());
        assert_eq!(state.roles(), Default::default());
    }

    #[tokio::test]
    async fn sign_out_clears_state_when_provider_errors() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let guru = identity();
        resolver.insert(Profile::sample(guru.id, Role::Guru));
        provider.set_sign_out(SignOutBehavior::Fail);

        let store = store_with(&provider, &resolver);
        provider.emit(AuthEvent::SignedIn, Some(guru.clone()));
        wait_until(&store, |s| s.resolution == Resolution::Found).await;

        store.sign_out().await;
        assert!(store.snapshot().identity.is_none());
    }

    #[tokio::test]
    async fn resolution_landing_after_sign_out_is_dropped() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let guru = identity();
        resolver.insert(Profile::sample(guru.id, Role::Guru));
        let gate = resolver.gate(guru.id);

        let store = store_with(&provider, &resolver);
        provider.emit(AuthEvent::SignedIn, Some(guru.clone()));
        wait_until(&store, |s| s.identity.is_some() && s.resolution == Resolution::Pending).await;

        store.sign_out().await;
        gate.notify_one();
        wait_for_calls(&resolver, guru.id, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = store.snapshot();
        assert!(state.profile.is_none());
        assert_eq!(state.resolution, Resolution::Idle);
    }

    #[tokio::test]
    async fn sign_up_eventually_yields_guru_profile() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        provider.provision_into(resolver.clone(), Duration::from_millis(15));

        let store = store_with(&provider, &resolver);
        let outcome = store.sign_up("t@x.com", "abc123", "Budi", "budi").await.unwrap();
        assert_eq!(outcome, SignUpOutcome::SignedIn);

        let state = wait_until(&store, |s| s.resolution == Resolution::Found).await;
        let profile = state.profile.unwrap();
        assert_eq!(profile.role, Role::Guru);
        assert_eq!(profile.nama, "Budi");
        assert_eq!(profile.username, "budi");
    }

    #[tokio::test]
    async fn sign_up_rejects_bad_input_before_calling_provider() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let store = store_with(&provider, &resolver);

        let err = store.sign_up("t@x.com", "abc", "Budi", "budi").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(provider.sign_up_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_an_auth_error() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        provider.add_account("t@x.com", "abc123", identity());
        let store = store_with(&provider, &resolver);

        let err = store.sign_up("t@x.com", "abc123", "Budi", "budi").await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn edited_profile_replaces_the_committed_one() {
        let provider = FakeProvider::new();
        let resolver = FakeResolver::new();
        let guru = identity();
        resolver.insert(Profile::sample(guru.id, Role::Guru));
        provider.add_account("budi@x.com", "secret1", guru.clone());

        let store = store_with(&provider, &resolver);
        store.sign_in("budi@x.com", "secret1").await.unwrap();
        wait_until(&store, |s| s.resolution == Resolution::Found).await;

        let mut edited = Profile::sample(guru.id, Role::Guru);
        edited.nama = "Budi Santoso".into();
        assert!(store.refresh_profile(edited));
        assert_eq!(store.snapshot().profile.unwrap().nama, "Budi Santoso");

        let stranger = Profile::sample(uuid::Uuid::new_v4(), Role::Admin);
        assert!(!store.refresh_profile(stranger));
        assert!(!store.snapshot().roles().is_admin);
    }
}
