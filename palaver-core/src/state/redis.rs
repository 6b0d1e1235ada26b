//! Redis-backed state adapter.
//!
//! The production backend: a Redis set for subscriptions, `SET NX PX`
//! string keys for locks, and JSON-encoded string keys for the cache.
//! Fencing is implemented by two Lua scripts that atomically compare the
//! stored token before deleting (release) or re-arming the TTL (extend);
//! a mismatched token is a no-op.
//!
//! Key layout under the configurable prefix (default `chat-sdk`):
//!
//! ```text
//! <prefix>:subscriptions          set of thread ids
//! <prefix>:lock:<threadId>        string, value = fencing token, PX = ttl
//! <prefix>:cache:<key>            string, JSON value, optional PX
//! ```

use std::time::{Duration, Instant};

use async_stream::try_stream;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use super::{Lock, StateAdapter, StateError, SubscriptionStream, new_lock_token};
use crate::thread_id::ThreadId;

pub const DEFAULT_KEY_PREFIX: &str = "chat-sdk";

/// How many members SSCAN pulls per round trip.
const SCAN_COUNT: usize = 100;

/// Delete the lock key only while it still holds our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Re-arm the lock TTL only while the key still holds our token. An
/// expired lock has no key, so extension of it returns 0.
const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Distributed state adapter over a shared Redis instance.
pub struct RedisStateAdapter {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    prefix: String,
}

impl RedisStateAdapter {
    /// Create an adapter for `url` with the default key prefix.
    pub fn new(url: &str) -> Result<Self, StateError> {
        Self::with_prefix(url, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(url: &str, prefix: &str) -> Result<Self, StateError> {
        let client = redis::Client::open(url)
            .map_err(|e| StateError::Backend(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            prefix: prefix.to_string(),
        })
    }

    fn subscriptions_key(&self) -> String {
        format!("{}:subscriptions", self.prefix)
    }

    fn lock_key(&self, thread: &ThreadId) -> String {
        format!("{}:lock:{}", self.prefix, thread)
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:cache:{key}", self.prefix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StateError> {
        match &*self.conn.lock().await {
            Some(conn) => Ok(conn.clone()),
            None => Err(StateError::NotConnected),
        }
    }
}

fn backend(e: redis::RedisError) -> StateError {
    StateError::Backend(e.to_string())
}

/// Cached values are stored as JSON; values written by other tooling may
/// be plain strings, so decoding falls back to the raw string.
fn decode_cache_value(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl StateAdapter for RedisStateAdapter {
    async fn connect(&self) -> Result<(), StateError> {
        // The guard is held across the handshake: concurrent callers queue
        // behind it and find the connection already established.
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        *guard = Some(conn);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StateError> {
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            let quit: Result<(), _> = redis::cmd("QUIT").query_async(&mut conn).await;
            if let Err(e) = quit {
                log::debug!("redis QUIT failed during disconnect: {e}");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, thread: &ThreadId) -> Result<(), StateError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("SADD")
            .arg(self.subscriptions_key())
            .arg(thread.as_str())
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn unsubscribe(&self, thread: &ThreadId) -> Result<(), StateError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("SREM")
            .arg(self.subscriptions_key())
            .arg(thread.as_str())
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn is_subscribed(&self, thread: &ThreadId) -> Result<bool, StateError> {
        let mut conn = self.connection().await?;
        redis::cmd("SISMEMBER")
            .arg(self.subscriptions_key())
            .arg(thread.as_str())
            .query_async(&mut conn)
            .await
            .map_err(backend)
    }

    async fn list_subscriptions(
        &self,
        adapter: Option<&str>,
    ) -> Result<SubscriptionStream, StateError> {
        let mut conn = self.connection().await?;
        let key = self.subscriptions_key();
        let prefix = adapter.map(|a| format!("{a}:"));

        Ok(Box::pin(try_stream! {
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SSCAN")
                    .arg(&key)
                    .arg(cursor)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .map_err(backend)?;
                for raw in batch {
                    if prefix.as_ref().is_some_and(|p| !raw.starts_with(p.as_str())) {
                        continue;
                    }
                    match ThreadId::parse(&raw) {
                        Ok(thread) => yield thread,
                        Err(e) => log::warn!("skipping malformed subscription '{raw}': {e}"),
                    }
                }
                if next == 0 {
                    break;
                }
                cursor = next;
            }
        }))
    }

    async fn acquire_lock(
        &self,
        thread: &ThreadId,
        ttl: Duration,
    ) -> Result<Option<Lock>, StateError> {
        let mut conn = self.connection().await?;
        let token = new_lock_token();
        let acquired_at = Instant::now();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(thread))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(reply.map(|_| Lock {
            thread_id: thread.clone(),
            token,
            expires_at: acquired_at + ttl,
        }))
    }

    async fn release_lock(&self, lock: &Lock) -> Result<(), StateError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.lock_key(&lock.thread_id))
            .arg(&lock.token)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn extend_lock(&self, lock: &Lock, ttl: Duration) -> Result<bool, StateError> {
        let mut conn = self.connection().await?;
        let extended: i64 = redis::Script::new(EXTEND_SCRIPT)
            .key(self.lock_key(&lock.thread_id))
            .arg(&lock.token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(extended == 1)
    }

    async fn cache_get(&self, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.cache_key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(raw.map(decode_cache_value))
    }

    async fn cache_set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let mut conn = self.connection().await?;
        let encoded = serde_json::to_string(&value)
            .map_err(|e| StateError::Backend(format!("unencodable cache value: {e}")))?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.cache_key(key)).arg(encoded);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn cache_delete(&self, key: &str) -> Result<(), StateError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(self.cache_key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
