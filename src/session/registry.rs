use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::session::store::SessionStore;

/// Builds a fresh, not yet initialized store for a new browser session.
pub type StoreFactory = Arc<dyn Fn() -> Arc<SessionStore> + Send + Sync>;

struct Entry {
    store: Arc<SessionStore>,
    last_seen: Instant,
}

/// Browser session id (cookie) to Session Store.
pub struct SessionRegistry {
    factory: StoreFactory,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new(factory: StoreFactory, idle_ttl: Duration) -> Self {
        Self {
            factory,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self) -> (Uuid, Arc<SessionStore>) {
        let id = Uuid::new_v4();
        let store = (self.factory)();
        store.initialize();
        self.sessions.lock().insert(
            id,
            Entry { store: store.clone(), last_seen: Instant::now() },
        );
        debug!("session {} created", id);
        (id, store)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<SessionStore>> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.store.clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<SessionStore>> {
        let entry = self.sessions.lock().remove(id)?;
        entry.store.shutdown();
        debug!("session {} removed", id);
        Some(entry.store)
    }

    /// Drop sessions idle for longer than the TTL. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Entry> = {
            let mut sessions = self.sessions.lock();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_seen) > self.idle_ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for entry in &expired {
            entry.store.shutdown();
        }
        if !expired.is_empty() {
            info!("expired {} idle sessions, {} active", expired.len(), self.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
