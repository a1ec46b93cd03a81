// In-memory identity provider and profile resolver used by tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use crate::models::profile::{Profile, Role};
use crate::models::user::Identity;
use crate::repositories::profile_supabase_repo::{ProfileResolver, ResolutionError};
use crate::services::identity_provider::{
    AuthChange, AuthError, AuthEvent, AuthSubscription, IdentityProvider, SignUpOutcome,
    SignUpRequest,
};
use crate::session::state::SessionState;
use crate::session::store::{SessionStore, StoreOptions};

pub fn identity() -> Identity {
    let id = Uuid::new_v4();
    Identity { id, email: format!("{}@x.com", id.simple()) }
}

pub fn test_options() -> StoreOptions {
    StoreOptions {
        username_email_domain: "guru.local".into(),
        profile_retry_attempts: 5,
        profile_retry_delay: Duration::from_millis(10),
        sign_out_timeout: Duration::from_millis(100),
    }
}

/// Wait for the store to reach a state matching `pred`, failing the test after 2s.
pub async fn wait_until<F>(store: &SessionStore, pred: F) -> SessionState
where
    F: Fn(&SessionState) -> bool,
{
    let mut rx = store.subscribe();
    let wait = async { rx.wait_for(|s| pred(s)).await.map(|s| (*s).clone()) };
    match tokio::time::timeout(Duration::from_secs(2), wait).await {
        Ok(Ok(state)) => state,
        _ => panic!("session never reached expected state: {:?}", store.snapshot()),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SignOutBehavior {
    Ok,
    Fail,
    Hang,
}

pub struct FakeProvider {
    changes: broadcast::Sender<AuthChange>,
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    current: Mutex<Option<Identity>>,
    sign_out: Mutex<SignOutBehavior>,
    provision: Mutex<Option<(Arc<FakeResolver>, Duration)>>,
    subscriptions: AtomicUsize,
    sign_in_calls: AtomicUsize,
    sign_up_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(16);
        Arc::new(Self {
            changes,
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            sign_out: Mutex::new(SignOutBehavior::Ok),
            provision: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            sign_up_calls: AtomicUsize::new(0),
        })
    }

    pub fn add_account(&self, email: &str, password: &str, identity: Identity) {
        self.accounts
            .lock()
            .insert(email.to_string(), (password.to_string(), identity));
    }

    /// Push an identity change as if it came from the provider.
    pub fn emit(&self, event: AuthEvent, identity: Option<Identity>) {
        *self.current.lock() = identity.clone();
        let _ = self.changes.send(AuthChange::new(event, identity));
    }

    pub fn set_sign_out(&self, behavior: SignOutBehavior) {
        *self.sign_out.lock() = behavior;
    }

    /// Simulate the server-side trigger: after sign-up, insert the profile
    /// into `resolver` once `delay` has passed.
    pub fn provision_into(&self, resolver: Arc<FakeResolver>, delay: Duration) {
        *self.provision.lock() = Some((resolver, delay));
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn receiver_count(&self) -> usize {
        self.changes.receiver_count()
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_up_calls(&self) -> usize {
        self.sign_up_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.accounts.lock().get(email).cloned();
        match found {
            Some((expected, identity)) if expected == password => {
                self.emit(AuthEvent::SignedIn, Some(identity));
                Ok(())
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        if self.accounts.lock().contains_key(&request.email) {
            return Err(AuthError::DuplicateEmail);
        }
        let identity = Identity { id: Uuid::new_v4(), email: request.email.clone() };
        self.add_account(&request.email, &request.password, identity.clone());

        let provision = self.provision.lock().clone();
        if let Some((resolver, delay)) = provision {
            let meta = request.metadata();
            let profile = Profile {
                id: Uuid::new_v4(),
                user_id: identity.id,
                nama: meta["nama"].as_str().unwrap_or_default().to_string(),
                username: meta["username"].as_str().unwrap_or_default().to_string(),
                role: meta["role"].as_str().unwrap_or_default().parse().unwrap_or(Role::Guru),
                created_at: None,
                updated_at: None,
            };
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                resolver.insert(profile);
            });
        }

        self.emit(AuthEvent::SignedIn, Some(identity));
        Ok(SignUpOutcome::SignedIn)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.emit(AuthEvent::SignedOut, None);
        let behavior = *self.sign_out.lock();
        match behavior {
            SignOutBehavior::Ok => Ok(()),
            SignOutBehavior::Fail => Err(AuthError::Supabase("provider unreachable".into())),
            SignOutBehavior::Hang => std::future::pending().await,
        }
    }

    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.current.lock().as_ref().map(|i| format!("token-{}", i.id)))
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let rx = self.changes.subscribe();
        let current = self.current.lock().clone();
        AuthSubscription::new(AuthChange::new(AuthEvent::InitialSession, current), rx)
    }
}

#[derive(Default)]
pub struct FakeResolver {
    profiles: Mutex<HashMap<Uuid, Profile>>,
    failures: Mutex<HashMap<Uuid, String>>,
    gates: Mutex<HashMap<Uuid, Arc<Notify>>>,
    completed: Mutex<HashMap<Uuid, usize>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles.lock().insert(profile.user_id, profile);
    }

    pub fn fail(&self, user_id: Uuid, reason: &str) {
        self.failures.lock().insert(user_id, reason.to_string());
    }

    /// Hold every resolution for `user_id` until the returned gate is notified.
    pub fn gate(&self, user_id: Uuid) -> Arc<Notify> {
        self.gates
            .lock()
            .entry(user_id)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn completed(&self, user_id: Uuid) -> usize {
        self.completed.lock().get(&user_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ProfileResolver for FakeResolver {
    async fn resolve(&self, identity: &Identity) -> Result<Option<Profile>, ResolutionError> {
        let gate = self.gates.lock().get(&identity.id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        *self.completed.lock().entry(identity.id).or_insert(0) += 1;

        if let Some(reason) = self.failures.lock().get(&identity.id) {
            return Err(ResolutionError(reason.clone()));
        }
        Ok(self.profiles.lock().get(&identity.id).cloned())
    }
}
