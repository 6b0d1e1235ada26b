//! Rolling-listener coordination.
//!
//! Serverless hosts bound each invocation, so gateway continuity comes
//! from overlapping listeners: a cron starts a new one before the old
//! one's deadline, and the newcomer announces itself on a pub/sub control
//! channel. Incumbents hearing a foreign listener id abort; a listener
//! ignores its own announcement. Control-channel failures degrade to an
//! uncoordinated listener — they never abort the gateway itself.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use palaver_core::adapter::GatewayListener;
use palaver_core::error::AdapterError;

use crate::adapter::ADAPTER_NAME;

pub const CONTROL_CHANNEL: &str = "discord:gateway:control";

/// Listener durations are capped at ten minutes.
pub const MAX_LISTEN_DURATION: Duration = Duration::from_secs(600);

/// Soft timeout added to the pub/sub wait so the watcher task never
/// outlives the listener by more than a few seconds.
const HANDOVER_GRACE: Duration = Duration::from_secs(5);

/// The pub/sub channel listeners announce themselves on.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Open a subscription. Must be called before [`publish`] so the
    /// subscriber cannot miss its successor's announcement.
    async fn subscribe(&self) -> Result<BoxStream<'static, String>, AdapterError>;

    async fn publish(&self, payload: &str) -> Result<(), AdapterError>;
}

/// Redis pub/sub control channel (the production implementation).
pub struct RedisControlChannel {
    client: redis::Client,
}

impl RedisControlChannel {
    pub fn new(url: &str) -> Result<Self, AdapterError> {
        let client = redis::Client::open(url).map_err(|e| {
            AdapterError::validation(ADAPTER_NAME, format!("invalid redis url: {e}"))
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ControlChannel for RedisControlChannel {
    async fn subscribe(&self) -> Result<BoxStream<'static, String>, AdapterError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        pubsub
            .subscribe(CONTROL_CHANNEL)
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        Ok(Box::pin(pubsub.into_on_message().filter_map(|msg| async move {
            msg.get_payload::<String>().ok()
        })))
    }

    async fn publish(&self, payload: &str) -> Result<(), AdapterError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        let _: i64 = redis::cmd("PUBLISH")
            .arg(CONTROL_CHANNEL)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        Ok(())
    }
}

/// In-process control channel over a broadcast queue. Used in tests and
/// in single-process deployments that have no Redis.
pub struct LocalControlChannel {
    tx: tokio::sync::broadcast::Sender<String>,
}

impl LocalControlChannel {
    pub fn new() -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        Self { tx }
    }
}

impl Default for LocalControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlChannel for LocalControlChannel {
    async fn subscribe(&self) -> Result<BoxStream<'static, String>, AdapterError> {
        let mut rx = self.tx.subscribe();
        Ok(Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(payload) => yield payload,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    async fn publish(&self, payload: &str) -> Result<(), AdapterError> {
        // Send errors only mean no subscriber is listening yet.
        let _ = self.tx.send(payload.to_string());
        Ok(())
    }
}

/// Generate a unique listener id.
pub fn new_listener_id() -> String {
    let fragment = uuid::Uuid::new_v4().to_string();
    format!(
        "listener-{}-{}",
        Utc::now().timestamp_millis(),
        &fragment[..8]
    )
}

/// Run `gateway` for at most `duration`, coordinated over `control`.
///
/// Announces a fresh listener id (subscribing first so no successor is
/// missed), then runs the gateway until its deadline or until a foreign
/// announcement arrives and cancels it.
pub async fn run_coordinated(
    control: &dyn ControlChannel,
    gateway: &dyn GatewayListener,
    duration: Duration,
) -> Result<(), AdapterError> {
    let duration = duration.min(MAX_LISTEN_DURATION);
    let listener_id = new_listener_id();
    let cancel = CancellationToken::new();

    match control.subscribe().await {
        Ok(mut announcements) => {
            if let Err(e) = control.publish(&listener_id).await {
                log::warn!("failed to announce {listener_id}: {e}");
            }
            let watcher_cancel = cancel.clone();
            let own_id = listener_id.clone();
            let grace = duration + HANDOVER_GRACE;
            tokio::spawn(async move {
                let wait = async {
                    while let Some(payload) = announcements.next().await {
                        if payload == own_id {
                            continue;
                        }
                        log::info!("{own_id}: successor {payload} announced, handing over");
                        watcher_cancel.cancel();
                        break;
                    }
                };
                tokio::select! {
                    () = watcher_cancel.cancelled() => {}
                    _ = tokio::time::timeout(grace, wait) => {}
                }
            });
        }
        Err(e) => {
            log::warn!("control channel unavailable ({e}); listener {listener_id} runs uncoordinated");
        }
    }

    log::info!("{listener_id}: listening for up to {duration:?}");
    let result = gateway.run(duration, cancel.clone()).await;
    // Reap the watcher task if it is still waiting.
    cancel.cancel();
    result
}
