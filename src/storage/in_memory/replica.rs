use std::{
    cmp::max,
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::{
    error::{LockError, Result},
    lock::WriteToken,
    storage::traits::{read_key, write_key, ReplicaClient},
};

struct ReadState {
    count: i64,
    expires_at: Instant,
}

struct WriteState {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
struct StoreData {
    readers: HashMap<String, ReadState>,
    writers: HashMap<String, WriteState>,
}

impl StoreData {
    // Expired state is treated as absent. Dropping it on access keeps the
    // map from accumulating entries for crashed holders.
    fn purge_expired(&mut self, resource: &str, now: Instant) {
        let rdkey = read_key(resource);
        if self.readers.get(&rdkey).is_some_and(|s| s.expires_at <= now) {
            self.readers.remove(&rdkey);
        }
        let wrkey = write_key(resource);
        if self.writers.get(&wrkey).is_some_and(|s| s.expires_at <= now) {
            self.writers.remove(&wrkey);
        }
    }
}

/// Shared state of one in-memory lock-store replica.
///
/// Clones share the same underlying store, so several [`InMemoryReplica`]
/// handles (e.g. from two coordinators in a test) observe the same lock
/// state. A single mutex around the whole store makes every lock-state
/// transition a single critical section.
#[derive(Clone)]
pub struct InMemoryStore {
    data: Arc<Mutex<StoreData>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            data: Arc::new(Mutex::new(StoreData::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Fault injection for tests: an unavailable store makes every replica
    /// operation fail, like an unreachable endpoint would.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn read_count(&self, resource: &str) -> Option<i64> {
        let mut data = self.data.lock().await;
        data.purge_expired(resource, Instant::now());
        data.readers.get(&read_key(resource)).map(|s| s.count)
    }

    pub async fn write_token(&self, resource: &str) -> Option<String> {
        let mut data = self.data.lock().await;
        data.purge_expired(resource, Instant::now());
        data.writers.get(&write_key(resource)).map(|s| s.token.clone())
    }

    pub async fn read_ttl_remaining(&self, resource: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut data = self.data.lock().await;
        data.purge_expired(resource, now);
        data.readers.get(&read_key(resource)).map(|s| s.expires_at - now)
    }
}

/// In-memory implementation of [`ReplicaClient`], the test double for a
/// real lock-store endpoint.
#[derive(Clone)]
pub struct InMemoryReplica {
    store: InMemoryStore,
}

impl InMemoryReplica {
    fn ensure_available(&self) -> Result<()> {
        if self.store.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockError::ReplicaUnavailable("in-memory replica marked unreachable".to_string()))
        }
    }
}

impl ReplicaClient for InMemoryReplica {
    type Config = InMemoryStore;

    async fn connect(config: &InMemoryStore) -> Result<Self> {
        Ok(InMemoryReplica { store: config.clone() })
    }

    async fn try_read_lock(&self, resource: &str, ttl: Duration) -> Result<i64> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut data = self.store.data.lock().await;
        data.purge_expired(resource, now);
        if data.writers.contains_key(&write_key(resource)) {
            return Ok(0);
        }
        let state = data
            .readers
            .entry(read_key(resource))
            .or_insert(ReadState { count: 0, expires_at: now });
        state.count += 1;
        state.expires_at = max(state.expires_at, now + ttl);
        Ok(state.count)
    }

    async fn try_write_lock(&self, resource: &str, ttl: Duration, token: &WriteToken) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut data = self.store.data.lock().await;
        data.purge_expired(resource, now);
        if data.writers.contains_key(&write_key(resource))
            || data.readers.contains_key(&read_key(resource))
        {
            return Ok(false);
        }
        data.writers.insert(
            write_key(resource),
            WriteState { token: token.as_str().to_string(), expires_at: now + ttl },
        );
        Ok(true)
    }

    async fn try_read_unlock(&self, resource: &str) -> Result<i64> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut data = self.store.data.lock().await;
        data.purge_expired(resource, now);
        let rdkey = read_key(resource);
        let Some(state) = data.readers.get_mut(&rdkey) else {
            return Ok(0);
        };
        state.count -= 1;
        let remaining = state.count;
        if remaining <= 0 {
            data.readers.remove(&rdkey);
        }
        Ok(remaining)
    }

    async fn try_write_unlock(&self, resource: &str, token: &WriteToken) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut data = self.store.data.lock().await;
        data.purge_expired(resource, now);
        let wrkey = write_key(resource);
        if data.writers.get(&wrkey).is_some_and(|s| s.token == token.as_str()) {
            data.writers.remove(&wrkey);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(1);

    async fn replica(store: &InMemoryStore) -> InMemoryReplica {
        InMemoryReplica::connect(store).await.unwrap()
    }

    #[tokio::test]
    async fn readers_count_up_and_down() {
        let store = InMemoryStore::new();
        let rep = replica(&store).await;
        assert_eq!(rep.try_read_lock("res", TTL).await.unwrap(), 1);
        assert_eq!(rep.try_read_lock("res", TTL).await.unwrap(), 2);
        assert_eq!(rep.try_read_unlock("res").await.unwrap(), 1);
        assert_eq!(rep.try_read_unlock("res").await.unwrap(), 0);
        assert_eq!(store.read_count("res").await, None);
        // further unlocks find no state
        assert_eq!(rep.try_read_unlock("res").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn write_lock_excludes_readers_and_vice_versa() {
        let store = InMemoryStore::new();
        let rep = replica(&store).await;
        let token = WriteToken::generate();

        assert_eq!(rep.try_read_lock("res", TTL).await.unwrap(), 1);
        assert!(!rep.try_write_lock("res", TTL, &token).await.unwrap());
        assert_eq!(rep.try_read_unlock("res").await.unwrap(), 0);

        assert!(rep.try_write_lock("res", TTL, &token).await.unwrap());
        assert_eq!(rep.try_read_lock("res", TTL).await.unwrap(), 0);
        // no re-entry or upgrade while held
        assert!(!rep.try_write_lock("res", TTL, &WriteToken::generate()).await.unwrap());
    }

    #[tokio::test]
    async fn write_unlock_requires_matching_token() {
        let store = InMemoryStore::new();
        let rep = replica(&store).await;
        let token = WriteToken::generate();
        assert!(rep.try_write_lock("res", TTL, &token).await.unwrap());

        assert!(!rep.try_write_unlock("res", &WriteToken::from("wrong".to_string())).await.unwrap());
        assert_eq!(store.write_token("res").await.as_deref(), Some(token.as_str()));

        assert!(rep.try_write_unlock("res", &token).await.unwrap());
        assert_eq!(store.write_token("res").await, None);
        assert!(!rep.try_write_unlock("res", &token).await.unwrap());
    }

    #[tokio::test]
    async fn expired_state_is_treated_as_absent() {
        let store = InMemoryStore::new();
        let rep = replica(&store).await;
        let ttl = Duration::from_millis(20);
        assert!(rep.try_write_lock("res", ttl, &WriteToken::generate()).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(rep.try_read_lock("res", TTL).await.unwrap(), 1);

        assert!(rep.try_write_lock("other", ttl, &WriteToken::generate()).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rep.try_write_lock("other", TTL, &WriteToken::generate()).await.unwrap());
    }

    #[tokio::test]
    async fn read_ttl_is_only_ever_extended() {
        let store = InMemoryStore::new();
        let rep = replica(&store).await;
        assert_eq!(rep.try_read_lock("res", Duration::from_secs(10)).await.unwrap(), 1);
        assert_eq!(rep.try_read_lock("res", Duration::from_millis(50)).await.unwrap(), 2);
        let remaining = store.read_ttl_remaining("res").await.unwrap();
        assert!(remaining > Duration::from_secs(9));

        assert_eq!(rep.try_read_lock("res", Duration::from_secs(20)).await.unwrap(), 3);
        let remaining = store.read_ttl_remaining("res").await.unwrap();
        assert!(remaining > Duration::from_secs(19));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = InMemoryStore::new();
        let rep = replica(&store).await;
        store.set_available(false);
        assert!(rep.try_read_lock("res", TTL).await.is_err());
        assert!(rep.try_write_lock("res", TTL, &WriteToken::generate()).await.is_err());
        assert!(rep.try_read_unlock("res").await.is_err());
        assert!(rep.try_write_unlock("res", &WriteToken::generate()).await.is_err());

        store.set_available(true);
        assert_eq!(rep.try_read_lock("res", TTL).await.unwrap(), 1);
    }
}
