//! In-memory state adapter.
//!
//! The reference backend: process-local, volatile, suitable for
//! development and as a test double. Lock TTLs are enforced lazily — every
//! lock-path operation first reaps entries whose deadline has passed, so
//! an expired lock is indistinguishable from no lock.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream;

use super::{Lock, StateAdapter, StateError, SubscriptionStream, belongs_to, new_lock_token};
use crate::thread_id::ThreadId;

struct LockRecord {
    token: String,
    expires_at: Instant,
}

struct CacheRecord {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    connected: bool,
    subscriptions: HashSet<ThreadId>,
    locks: HashMap<ThreadId, LockRecord>,
    cache: HashMap<String, CacheRecord>,
}

impl Inner {
    fn reap_locks(&mut self, now: Instant) {
        self.locks.retain(|_, record| record.expires_at > now);
    }
}

/// Volatile single-process state adapter.
pub struct MemoryStateAdapter {
    inner: Mutex<Inner>,
}

impl MemoryStateAdapter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn with_connected<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(StateError::NotConnected);
        }
        f(&mut inner)
    }
}

impl Default for MemoryStateAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateAdapter for MemoryStateAdapter {
    async fn connect(&self) -> Result<(), StateError> {
        self.inner.lock().unwrap().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.subscriptions.clear();
        inner.locks.clear();
        inner.cache.clear();
        Ok(())
    }

    async fn subscribe(&self, thread: &ThreadId) -> Result<(), StateError> {
        self.with_connected(|inner| {
            inner.subscriptions.insert(thread.clone());
            Ok(())
        })
    }

    async fn unsubscribe(&self, thread: &ThreadId) -> Result<(), StateError> {
        self.with_connected(|inner| {
            inner.subscriptions.remove(thread);
            Ok(())
        })
    }

    async fn is_subscribed(&self, thread: &ThreadId) -> Result<bool, StateError> {
        self.with_connected(|inner| Ok(inner.subscriptions.contains(thread)))
    }

    async fn list_subscriptions(
        &self,
        adapter: Option<&str>,
    ) -> Result<SubscriptionStream, StateError> {
        let snapshot: Vec<ThreadId> = self.with_connected(|inner| {
            Ok(inner
                .subscriptions
                .iter()
                .filter(|t| adapter.is_none_or(|a| belongs_to(t, a)))
                .cloned()
                .collect())
        })?;
        Ok(Box::pin(stream::iter(snapshot.into_iter().map(Ok))))
    }

    async fn acquire_lock(
        &self,
        thread: &ThreadId,
        ttl: Duration,
    ) -> Result<Option<Lock>, StateError> {
        self.with_connected(|inner| {
            let now = Instant::now();
            inner.reap_locks(now);
            if inner.locks.contains_key(thread) {
                return Ok(None);
            }
            let token = new_lock_token();
            let expires_at = now + ttl;
            inner.locks.insert(
                thread.clone(),
                LockRecord {
                    token: token.clone(),
                    expires_at,
                },
            );
            Ok(Some(Lock {
                thread_id: thread.clone(),
                token,
                expires_at,
            }))
        })
    }

    async fn release_lock(&self, lock: &Lock) -> Result<(), StateError> {
        self.with_connected(|inner| {
            inner.reap_locks(Instant::now());
            if inner
                .locks
                .get(&lock.thread_id)
                .is_some_and(|record| record.token == lock.token)
            {
                inner.locks.remove(&lock.thread_id);
            }
            Ok(())
        })
    }

    async fn extend_lock(&self, lock: &Lock, ttl: Duration) -> Result<bool, StateError> {
        self.with_connected(|inner| {
            let now = Instant::now();
            inner.reap_locks(now);
            match inner.locks.get_mut(&lock.thread_id) {
                Some(record) if record.token == lock.token => {
                    record.expires_at = now + ttl;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    async fn cache_get(&self, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        self.with_connected(|inner| {
            let expired = inner
                .cache
                .get(key)
                .is_some_and(|record| record.expires_at.is_some_and(|at| at <= Instant::now()));
            if expired {
                inner.cache.remove(key);
                return Ok(None);
            }
            Ok(inner.cache.get(key).map(|record| record.value.clone()))
        })
    }

    async fn cache_set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        self.with_connected(|inner| {
            inner.cache.insert(
                key.to_string(),
                CacheRecord {
                    value,
                    expires_at: ttl.map(|t| Instant::now() + t),
                },
            );
            Ok(())
        })
    }

    async fn cache_delete(&self, key: &str) -> Result<(), StateError> {
        self.with_connected(|inner| {
            inner.cache.remove(key);
            Ok(())
        })
    }
}
