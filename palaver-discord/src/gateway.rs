//! The Discord gateway listener.
//!
//! Holds an outbound WebSocket to the Discord gateway, answers the
//! heartbeat protocol, and forwards the dispatch frames the runtime cares
//! about to the webhook endpoint so the normal ingress path handles them.
//! The socket runs for a bounded duration and stops promptly on
//! cancellation; continuity across invocations is the coordinator's job.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use palaver_core::adapter::GatewayListener;
use palaver_core::error::AdapterError;

use crate::adapter::ADAPTER_NAME;

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// GUILDS + GUILD_MESSAGES + GUILD_MESSAGE_REACTIONS + MESSAGE_CONTENT.
const INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 10) | (1 << 15);

/// Dispatch types forwarded to the webhook endpoint.
const FORWARDED: &[&str] = &[
    "MESSAGE_CREATE",
    "MESSAGE_UPDATE",
    "MESSAGE_REACTION_ADD",
    "MESSAGE_REACTION_REMOVE",
];

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Option<serde_json::Value>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelloData {
    heartbeat_interval: u64,
}

pub struct DiscordGateway {
    token: String,
    /// Full URL dispatch frames are POSTed to, including any
    /// protection-bypass query parameter.
    forward_url: Option<String>,
    http: reqwest::Client,
}

impl DiscordGateway {
    pub fn new(token: String, forward_url: Option<String>) -> Self {
        Self {
            token,
            forward_url,
            http: reqwest::Client::new(),
        }
    }

    async fn forward(&self, kind: &str, payload: &serde_json::Value) {
        let Some(url) = &self.forward_url else {
            log::debug!("no forward url configured, dropping {kind}");
            return;
        };
        // Forwarding failures are logged and swallowed: losing one event
        // must not take the socket down.
        match self.http.post(url).json(payload).send().await {
            Ok(response) if !response.status().is_success() => {
                log::warn!("forwarding {kind} returned {}", response.status());
            }
            Ok(_) => {}
            Err(e) => log::warn!("forwarding {kind} failed: {e}"),
        }
    }
}

#[async_trait]
impl GatewayListener for DiscordGateway {
    async fn run(&self, duration: Duration, cancel: CancellationToken) -> Result<(), AdapterError> {
        let deadline = tokio::time::Instant::now() + duration;

        let (socket, _) = connect_async(GATEWAY_URL)
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        let (mut sink, mut stream) = socket.split();
        log::info!("discord gateway connected for up to {duration:?}");

        // Until HELLO arrives we do not know the heartbeat cadence.
        let mut heartbeat_interval = Duration::from_secs(41);
        let mut next_heartbeat = tokio::time::Instant::now() + heartbeat_interval;
        let mut last_seq: Option<u64> = None;
        let mut identified = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    log::info!("discord gateway listener cancelled");
                    break;
                }
                () = tokio::time::sleep_until(deadline) => {
                    log::info!("discord gateway listener reached its deadline");
                    break;
                }
                () = tokio::time::sleep_until(next_heartbeat) => {
                    next_heartbeat = tokio::time::Instant::now() + heartbeat_interval;
                    let beat = json!({ "op": OP_HEARTBEAT, "d": last_seq });
                    if let Err(e) = sink.send(WsMessage::text(beat.to_string())).await {
                        log::warn!("heartbeat send failed: {e}");
                        break;
                    }
                }
                frame = stream.next() => {
                    let Some(frame) = frame else {
                        log::info!("discord gateway closed the connection");
                        break;
                    };
                    let text = match frame {
                        Ok(WsMessage::Text(text)) => text,
                        Ok(WsMessage::Close(_)) => {
                            log::info!("discord gateway sent close");
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            log::warn!("gateway socket error: {e}");
                            break;
                        }
                    };
                    let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
                        Ok(payload) => payload,
                        Err(e) => {
                            log::warn!("undecodable gateway frame: {e}");
                            continue;
                        }
                    };
                    if let Some(seq) = payload.s {
                        last_seq = Some(seq);
                    }
                    match payload.op {
                        OP_HELLO => {
                            if let Some(hello) = payload
                                .d
                                .as_ref()
                                .and_then(|d| serde_json::from_value::<HelloData>(d.clone()).ok())
                            {
                                heartbeat_interval = Duration::from_millis(hello.heartbeat_interval);
                                // First beat goes out early; steady state
                                // follows the advertised interval.
                                next_heartbeat =
                                    tokio::time::Instant::now() + heartbeat_interval / 2;
                            }
                            if !identified {
                                let identify = json!({
                                    "op": OP_IDENTIFY,
                                    "d": {
                                        "token": self.token,
                                        "intents": INTENTS,
                                        "properties": {
                                            "os": std::env::consts::OS,
                                            "browser": "palaver",
                                            "device": "palaver"
                                        }
                                    }
                                });
                                if let Err(e) =
                                    sink.send(WsMessage::text(identify.to_string())).await
                                {
                                    log::warn!("identify send failed: {e}");
                                    break;
                                }
                                identified = true;
                            }
                        }
                        OP_HEARTBEAT => {
                            // The gateway may request an immediate beat.
                            let beat = json!({ "op": OP_HEARTBEAT, "d": last_seq });
                            if let Err(e) = sink.send(WsMessage::text(beat.to_string())).await {
                                log::warn!("requested heartbeat send failed: {e}");
                                break;
                            }
                        }
                        OP_HEARTBEAT_ACK => {}
                        OP_RECONNECT | OP_INVALID_SESSION => {
                            // A fresh listener invocation will reconnect;
                            // this one just winds down.
                            log::info!("gateway asked for a reconnect (op {})", payload.op);
                            break;
                        }
                        OP_DISPATCH => {
                            let kind = payload.t.as_deref().unwrap_or("");
                            if kind == "READY" {
                                log::info!("discord gateway session ready");
                            } else if FORWARDED.contains(&kind) {
                                let frame = json!({ "t": kind, "d": payload.d });
                                self.forward(kind, &frame).await;
                            }
                        }
                        other => log::debug!("ignoring gateway op {other}"),
                    }
                }
            }
        }

        let _ = sink.send(WsMessage::Close(None)).await;
        Ok(())
    }
}
