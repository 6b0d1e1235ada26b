//! Discord ingress: Ed25519 signature verification and normalization of
//! interaction webhooks and forwarded gateway frames.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Deserialize;

use palaver_core::emoji;
use palaver_core::error::AdapterError;
use palaver_core::thread_id::ThreadId;
use palaver_core::types::{Attachment, AttachmentData, Author, ChatEvent, Message, ReactionEvent};

use crate::adapter::ADAPTER_NAME;

/// Verify the `X-Signature-Ed25519` / `X-Signature-Timestamp` headers.
///
/// The signed payload is the timestamp concatenated with the raw body;
/// `verify_strict` is constant-time over the candidate signature.
pub fn verify_signature(
    public_key_hex: &str,
    signature_hex: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<(), AdapterError> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            AdapterError::authentication(ADAPTER_NAME).with_message("malformed discord public key")
        })?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| AdapterError::authentication(ADAPTER_NAME))?;

    let sig_bytes: [u8; 64] = hex::decode(signature_hex)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| AdapterError::authentication(ADAPTER_NAME))?;
    let signature = Signature::from_bytes(&sig_bytes);

    let mut signed = Vec::with_capacity(timestamp.len() + body.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.extend_from_slice(body);

    key.verify_strict(&signed, &signature)
        .map_err(|_| AdapterError::authentication(ADAPTER_NAME))
}

/// A decoded Discord webhook request.
#[derive(Debug)]
pub enum DiscordWebhook {
    /// Interaction endpoint liveness check; respond with `{"type": 1}`.
    Ping,
    /// Normalized events (possibly none, for frames we do not handle).
    Events(Vec<ChatEvent>),
}

#[derive(Debug, Deserialize)]
struct GatewayFrame {
    #[serde(default, rename = "t")]
    kind: Option<String>,
    #[serde(default, rename = "d")]
    data: Option<serde_json::Value>,
    /// Interaction webhooks carry `type` instead of an opcode envelope.
    #[serde(default, rename = "type")]
    interaction_type: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    author: AuthorData,
    #[serde(default)]
    mentions: Vec<MentionData>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    edited_timestamp: Option<String>,
    #[serde(default)]
    attachments: Vec<AttachmentRaw>,
}

#[derive(Debug, Deserialize)]
struct AttachmentRaw {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct AuthorData {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct MentionData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReactionData {
    user_id: String,
    channel_id: String,
    message_id: String,
    emoji: EmojiData,
}

#[derive(Debug, Deserialize)]
struct EmojiData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

fn invalid(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::validation(ADAPTER_NAME, format!("malformed discord payload: {e}"))
}

fn channel_thread(channel_id: &str) -> Result<ThreadId, AdapterError> {
    ThreadId::new(ADAPTER_NAME, channel_id).map_err(invalid)
}

/// Decode a webhook body (interaction or forwarded gateway frame).
///
/// `bot_user_id` is used to classify messages that mention the bot.
pub fn parse_webhook(
    body: &[u8],
    bot_user_id: Option<&str>,
) -> Result<DiscordWebhook, AdapterError> {
    let frame: GatewayFrame = serde_json::from_slice(body).map_err(invalid)?;

    if frame.interaction_type == Some(1) {
        return Ok(DiscordWebhook::Ping);
    }

    let Some(kind) = frame.kind.as_deref() else {
        log::debug!("ignoring discord webhook without a dispatch type");
        return Ok(DiscordWebhook::Events(Vec::new()));
    };
    let data = frame
        .data
        .ok_or_else(|| invalid(format!("{kind} frame without data")))?;

    let events = match kind {
        "MESSAGE_CREATE" => parse_message_data(&data, bot_user_id, false).map(|e| vec![e]),
        "MESSAGE_UPDATE" => parse_message_data(&data, bot_user_id, true).map(|e| vec![e]),
        "MESSAGE_REACTION_ADD" => parse_reaction_data(&data, true).map(|e| vec![e]),
        "MESSAGE_REACTION_REMOVE" => parse_reaction_data(&data, false).map(|e| vec![e]),
        other => {
            log::debug!("ignoring discord dispatch '{other}'");
            Ok(Vec::new())
        }
    };
    match events {
        Ok(events) => Ok(DiscordWebhook::Events(events)),
        Err(e) => {
            log::warn!("failed to normalize discord frame '{kind}': {e}");
            Ok(DiscordWebhook::Events(Vec::new()))
        }
    }
}

fn parse_message_data(
    data: &serde_json::Value,
    bot_user_id: Option<&str>,
    edited: bool,
) -> Result<ChatEvent, AdapterError> {
    let message = parse_message(data, edited)?;
    let raw: MessageData = serde_json::from_value(data.clone()).map_err(invalid)?;
    let mentions_bot =
        bot_user_id.is_some_and(|id| raw.mentions.iter().any(|m| m.id == id));
    Ok(if mentions_bot && !edited {
        ChatEvent::Mention(message)
    } else {
        ChatEvent::Message(message)
    })
}

/// Normalize a raw message object (`MESSAGE_CREATE`/`MESSAGE_UPDATE` data).
pub fn parse_message(data: &serde_json::Value, edited: bool) -> Result<Message, AdapterError> {
    let raw: MessageData = serde_json::from_value(data.clone()).map_err(invalid)?;
    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let attachments = raw
        .attachments
        .iter()
        .map(|a| Attachment {
            file_name: a.filename.clone(),
            mime_type: a.content_type.clone(),
            data: AttachmentData::Url { url: a.url.clone() },
        })
        .collect();
    Ok(Message {
        id: raw.id,
        thread_id: channel_thread(&raw.channel_id)?,
        author: Author {
            user_id: raw.author.id,
            user_name: raw.author.username,
            display_name: raw.author.global_name,
            bot: raw.author.bot,
        },
        text: raw.content,
        formatted: None,
        attachments,
        timestamp,
        edited: edited || raw.edited_timestamp.is_some(),
    })
}

fn parse_reaction_data(data: &serde_json::Value, added: bool) -> Result<ChatEvent, AdapterError> {
    let raw: ReactionData = serde_json::from_value(data.clone()).map_err(invalid)?;
    // Custom emoji are identified by name:id; standard emoji by the
    // unicode character in `name`.
    let raw_emoji = match (&raw.emoji.name, &raw.emoji.id) {
        (Some(name), Some(id)) => format!("{name}:{id}"),
        (Some(name), None) => name.clone(),
        _ => return Err(invalid("reaction without emoji name")),
    };
    Ok(ChatEvent::Reaction(ReactionEvent {
        adapter: ADAPTER_NAME.to_string(),
        thread_id: channel_thread(&raw.channel_id)?,
        message_id: raw.message_id,
        user_id: raw.user_id,
        emoji: emoji::normalize(&raw_emoji),
        raw_emoji,
        added,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn sign(key: &SigningKey, timestamp: &str, body: &[u8]) -> String {
        let mut signed = timestamp.as_bytes().to_vec();
        signed.extend_from_slice(body);
        hex::encode(key.sign(&signed).to_bytes())
    }

    #[test]
    fn valid_signature_passes() {
        let key = test_key();
        let public = hex::encode(key.verifying_key().to_bytes());
        let body = br#"{"type":1}"#;
        let signature = sign(&key, "1710000000", body);
        assert!(verify_signature(&public, &signature, "1710000000", body).is_ok());
    }

    #[test]
    fn wrong_timestamp_fails() {
        let key = test_key();
        let public = hex::encode(key.verifying_key().to_bytes());
        let body = br#"{"type":1}"#;
        let signature = sign(&key, "1710000000", body);
        let err = verify_signature(&public, &signature, "1710000001", body).unwrap_err();
        assert_eq!(err.code(), "AUTH_FAILED");
    }

    #[test]
    fn garbage_signature_fails() {
        let key = test_key();
        let public = hex::encode(key.verifying_key().to_bytes());
        let err = verify_signature(&public, "zz", "1710000000", b"{}").unwrap_err();
        assert_eq!(err.code(), "AUTH_FAILED");
    }

    #[test]
    fn interaction_ping_is_recognized() {
        let body = br#"{"type":1,"id":"123","application_id":"456"}"#;
        assert!(matches!(
            parse_webhook(body, None).unwrap(),
            DiscordWebhook::Ping
        ));
    }

    #[test]
    fn message_create_mentioning_the_bot_is_a_mention() {
        let body = serde_json::json!({
            "t": "MESSAGE_CREATE",
            "d": {
                "id": "900",
                "channel_id": "777",
                "content": "<@42> hello",
                "author": {"id": "100", "username": "ada"},
                "mentions": [{"id": "42"}],
                "timestamp": "2024-03-09T12:00:00+00:00"
            }
        });
        let webhook = parse_webhook(&serde_json::to_vec(&body).unwrap(), Some("42")).unwrap();
        match webhook {
            DiscordWebhook::Events(events) => match &events[0] {
                ChatEvent::Mention(m) => {
                    assert_eq!(m.thread_id.as_str(), "discord:777");
                    assert_eq!(m.author.user_name, "ada");
                }
                other => panic!("unexpected event: {other:?}"),
            },
            other => panic!("unexpected webhook: {other:?}"),
        }
    }

    #[test]
    fn message_create_without_mention_is_a_plain_message() {
        let body = serde_json::json!({
            "t": "MESSAGE_CREATE",
            "d": {
                "id": "901",
                "channel_id": "777",
                "content": "just chatting",
                "author": {"id": "100", "username": "ada", "bot": false},
                "mentions": []
            }
        });
        let webhook = parse_webhook(&serde_json::to_vec(&body).unwrap(), Some("42")).unwrap();
        match webhook {
            DiscordWebhook::Events(events) => {
                assert!(matches!(&events[0], ChatEvent::Message(_)));
            }
            other => panic!("unexpected webhook: {other:?}"),
        }
    }

    #[test]
    fn reaction_add_normalizes_unicode_emoji() {
        let body = serde_json::json!({
            "t": "MESSAGE_REACTION_ADD",
            "d": {
                "user_id": "100",
                "channel_id": "777",
                "message_id": "900",
                "emoji": {"id": null, "name": "🔥"}
            }
        });
        let webhook = parse_webhook(&serde_json::to_vec(&body).unwrap(), None).unwrap();
        match webhook {
            DiscordWebhook::Events(events) => match &events[0] {
                ChatEvent::Reaction(r) => {
                    assert_eq!(r.emoji, "fire");
                    assert_eq!(r.raw_emoji, "🔥");
                    assert!(r.added);
                }
                other => panic!("unexpected event: {other:?}"),
            },
            other => panic!("unexpected webhook: {other:?}"),
        }
    }

    #[test]
    fn unknown_dispatch_types_are_ignored() {
        let body = serde_json::json!({"t": "GUILD_CREATE", "d": {"id": "g1"}});
        match parse_webhook(&serde_json::to_vec(&body).unwrap(), None).unwrap() {
            DiscordWebhook::Events(events) => assert!(events.is_empty()),
            other => panic!("unexpected webhook: {other:?}"),
        }
    }
}
