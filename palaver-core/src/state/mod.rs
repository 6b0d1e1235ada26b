//! The state adapter contract.
//!
//! A state adapter owns the bot's persistent coordination state: the
//! subscription set, per-thread locks with fencing tokens, and a small
//! key-value cache. Two backends ship with the crate: [`memory`] for
//! development and tests, [`redis`] for production fleets.
//!
//! Every operation other than `connect` fails with
//! [`StateError::NotConnected`] before `connect()` or after
//! `disconnect()`.

pub mod memory;
pub mod redis;

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_core::stream::BoxStream;

use crate::thread_id::ThreadId;

/// Errors raised by state adapter operations.
#[derive(Debug)]
pub enum StateError {
    /// The adapter is not connected.
    NotConnected,
    /// The backing store failed.
    Backend(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "state adapter is not connected"),
            Self::Backend(msg) => write!(f, "state backend error: {msg}"),
        }
    }
}

impl std::error::Error for StateError {}

/// A held per-thread lock.
///
/// `token` is the fencing token: release and extend only take effect while
/// the presented token matches the current holder. `expires_at` is the
/// monotonic deadline observed at acquisition; extensions do not update it
/// (callers extending in a loop go by the extend result, not this field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub thread_id: ThreadId,
    pub token: String,
    pub expires_at: Instant,
}

/// A finite, lazily-produced listing of subscribed thread ids.
///
/// Not restartable; backends driven by cursor iteration hold only the
/// current batch in memory.
pub type SubscriptionStream = BoxStream<'static, Result<ThreadId, StateError>>;

/// Abstract operations over subscriptions, locks, and the cache.
#[async_trait]
pub trait StateAdapter: Send + Sync {
    /// Idempotent; concurrent callers share one in-flight connect.
    async fn connect(&self) -> Result<(), StateError>;

    /// Idempotent; volatile backends clear their state here.
    async fn disconnect(&self) -> Result<(), StateError>;

    async fn subscribe(&self, thread: &ThreadId) -> Result<(), StateError>;

    async fn unsubscribe(&self, thread: &ThreadId) -> Result<(), StateError>;

    async fn is_subscribed(&self, thread: &ThreadId) -> Result<bool, StateError>;

    /// List subscriptions, optionally filtered to one adapter's threads
    /// (prefix `<adapter>:`).
    async fn list_subscriptions(
        &self,
        adapter: Option<&str>,
    ) -> Result<SubscriptionStream, StateError>;

    /// Try to take the per-thread lock. Returns `None` while a valid
    /// (non-expired) lock for `thread` is held elsewhere.
    async fn acquire_lock(
        &self,
        thread: &ThreadId,
        ttl: Duration,
    ) -> Result<Option<Lock>, StateError>;

    /// Release `lock` if its token still matches the current holder;
    /// silently does nothing otherwise.
    async fn release_lock(&self, lock: &Lock) -> Result<(), StateError>;

    /// Extend the lock's TTL if the token still matches; returns false
    /// on mismatch or when the lock has already expired.
    async fn extend_lock(&self, lock: &Lock, ttl: Duration) -> Result<bool, StateError>;

    async fn cache_get(&self, key: &str) -> Result<Option<serde_json::Value>, StateError>;

    async fn cache_set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), StateError>;

    async fn cache_delete(&self, key: &str) -> Result<(), StateError>;
}

/// Generate an unguessable fencing token.
pub(crate) fn new_lock_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// True when `thread` belongs to `adapter` (prefix match on the grammar).
pub(crate) fn belongs_to(thread: &ThreadId, adapter: &str) -> bool {
    thread.adapter() == adapter
}
