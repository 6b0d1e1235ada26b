//! Slack webhook ingress: signature verification and event normalization.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use palaver_core::emoji;
use palaver_core::error::AdapterError;
use palaver_core::types::{Attachment, AttachmentData, Author, ChatEvent, Message, ReactionEvent};

use crate::adapter::{ADAPTER_NAME, SlackThread};

/// Requests older than this are rejected to stop signature replay.
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Verify Slack's `X-Slack-Signature` header.
///
/// The signature is `v0=<hex hmac-sha256>` over `v0:<timestamp>:<body>`.
/// Comparison is constant-time via `Mac::verify_slice`.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
) -> Result<(), AdapterError> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| AdapterError::authentication(ADAPTER_NAME))?;
    if (Utc::now().timestamp() - ts).abs() > MAX_TIMESTAMP_AGE_SECS {
        return Err(AdapterError::authentication(ADAPTER_NAME)
            .with_message("stale slack request timestamp"));
    }

    let hex_digest = signature
        .strip_prefix("v0=")
        .ok_or_else(|| AdapterError::authentication(ADAPTER_NAME))?;
    let expected =
        hex::decode(hex_digest).map_err(|_| AdapterError::authentication(ADAPTER_NAME))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC accepts any key size");
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| AdapterError::authentication(ADAPTER_NAME))
}

/// A decoded Slack webhook request.
#[derive(Debug)]
pub enum SlackWebhook {
    /// Endpoint ownership handshake: echo the challenge back.
    UrlVerification { challenge: String },
    /// Normalized events; unknown event types yield an empty list so the
    /// transport can ack with 200 and avoid retry storms.
    Events(Vec<ChatEvent>),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MessageEvent {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    text: Option<String>,
    ts: String,
    /// Absent on the nested message inside a `message_changed` wrapper;
    /// filled in from the outer event.
    #[serde(default)]
    channel: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    files: Vec<SlackFile>,
}

#[derive(Debug, Deserialize)]
struct SlackFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    url_private: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReactionItem {
    channel: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct ReactionChange {
    user: String,
    reaction: String,
    item: ReactionItem,
}

fn invalid(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::validation(ADAPTER_NAME, format!("malformed slack payload: {e}"))
}

/// Decode a webhook body into normalized events.
pub fn parse_webhook(body: &[u8]) -> Result<SlackWebhook, AdapterError> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(invalid)?;
    match envelope.kind.as_str() {
        "url_verification" => {
            let challenge = envelope
                .challenge
                .ok_or_else(|| invalid("url_verification without challenge"))?;
            Ok(SlackWebhook::UrlVerification { challenge })
        }
        "event_callback" => {
            let event = envelope
                .event
                .ok_or_else(|| invalid("event_callback without event"))?;
            Ok(SlackWebhook::Events(normalize_event(&event)))
        }
        other => {
            log::debug!("ignoring slack webhook of type '{other}'");
            Ok(SlackWebhook::Events(Vec::new()))
        }
    }
}

/// Normalize one inner Events API event. Unknown types produce no events.
fn normalize_event(event: &serde_json::Value) -> Vec<ChatEvent> {
    let kind = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let result = match kind {
        "app_mention" => parse_message_event(event).map(|m| vec![ChatEvent::Mention(m)]),
        "message" => parse_message_event(event).map(|m| vec![ChatEvent::Message(m)]),
        "reaction_added" => parse_reaction_event(event, true).map(|r| vec![ChatEvent::Reaction(r)]),
        "reaction_removed" => {
            parse_reaction_event(event, false).map(|r| vec![ChatEvent::Reaction(r)])
        }
        other => {
            log::debug!("ignoring slack event of type '{other}'");
            Ok(Vec::new())
        }
    };
    match result {
        Ok(events) => events,
        Err(e) => {
            log::warn!("failed to normalize slack event: {e}");
            Vec::new()
        }
    }
}

/// Normalize a `message` or `app_mention` event into a core message.
pub fn parse_message_event(raw: &serde_json::Value) -> Result<Message, AdapterError> {
    let event: MessageEvent = serde_json::from_value(raw.clone()).map_err(invalid)?;

    // Edits arrive as a `message_changed` wrapper carrying the new
    // message; other subtypes (joins, topic changes, …) are not chat
    // content.
    if let Some(subtype) = event.subtype.as_deref() {
        if subtype != "message_changed" {
            return Err(invalid(format!("unhandled message subtype '{subtype}'")));
        }
        let inner = event
            .message
            .as_ref()
            .ok_or_else(|| invalid("message_changed without message"))?;
        let mut inner: MessageEvent = serde_json::from_value(inner.clone()).map_err(invalid)?;
        inner.channel = event.channel;
        if inner.thread_ts.is_none() {
            inner.thread_ts = event.thread_ts;
        }
        return build_message(inner, true);
    }

    build_message(event, false)
}

fn build_message(event: MessageEvent, edited: bool) -> Result<Message, AdapterError> {
    if event.channel.is_empty() {
        return Err(invalid("message without channel"));
    }
    let user_id = event
        .user
        .clone()
        .or_else(|| event.bot_id.clone())
        .ok_or_else(|| invalid("message without author"))?;
    let thread = SlackThread {
        channel: event.channel,
        thread_ts: event.thread_ts.unwrap_or_else(|| event.ts.clone()),
    };
    // Files are referenced by URL; fetching them needs the bot token and
    // is the caller's decision.
    let attachments = event
        .files
        .iter()
        .filter_map(|file| {
            file.url_private.as_ref().map(|url| Attachment {
                file_name: file.name.clone(),
                mime_type: file.mimetype.clone(),
                data: AttachmentData::Url { url: url.clone() },
            })
        })
        .collect();
    Ok(Message {
        id: event.ts.clone(),
        thread_id: thread.encode(),
        author: Author {
            user_id: user_id.clone(),
            // Events carry only ids; resolving display names needs a
            // users.info round trip the ingress path does not make.
            user_name: user_id,
            display_name: None,
            bot: event.bot_id.is_some(),
        },
        text: event.text.unwrap_or_default(),
        formatted: None,
        attachments,
        timestamp: parse_slack_ts(&event.ts),
        edited,
    })
}

fn parse_reaction_event(
    raw: &serde_json::Value,
    added: bool,
) -> Result<ReactionEvent, AdapterError> {
    let change: ReactionChange = serde_json::from_value(raw.clone()).map_err(invalid)?;
    let thread = SlackThread {
        channel: change.item.channel,
        thread_ts: change.item.ts.clone(),
    };
    Ok(ReactionEvent {
        adapter: ADAPTER_NAME.to_string(),
        thread_id: thread.encode(),
        message_id: change.item.ts,
        user_id: change.user,
        emoji: emoji::normalize(&change.reaction),
        raw_emoji: change.reaction,
        added,
    })
}

/// Slack timestamps are `"<unix-seconds>.<sequence>"`.
fn parse_slack_ts(ts: &str) -> chrono::DateTime<Utc> {
    let seconds = ts
        .split('.')
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);
    chrono::DateTime::from_timestamp(seconds, 0).unwrap_or_else(Utc::now)
}
