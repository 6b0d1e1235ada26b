//! Google Chat webhook ingress: verification-token check and message
//! normalization.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use palaver_core::error::AdapterError;
use palaver_core::types::{Author, ChatEvent, Message};

use crate::adapter::{ADAPTER_NAME, GoogleChatThread};

/// Compare two secrets without leaking the mismatch position.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Verify the verification token carried in the event payload.
pub fn verify_token(expected: &str, presented: Option<&str>) -> Result<(), AdapterError> {
    match presented {
        Some(token) if constant_time_eq(expected.as_bytes(), token.as_bytes()) => Ok(()),
        _ => Err(AdapterError::authentication(ADAPTER_NAME)),
    }
}

#[derive(Debug, Deserialize)]
struct ChatEventPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage {
    name: String,
    sender: Sender,
    #[serde(default)]
    text: Option<String>,
    thread: Resource,
    space: Resource,
    #[serde(default)]
    create_time: Option<String>,
    #[serde(default)]
    last_update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sender {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    name: String,
}

fn invalid(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::validation(ADAPTER_NAME, format!("malformed google chat payload: {e}"))
}

/// Strip a resource prefix: `spaces/AAA` → `AAA`,
/// `spaces/AAA/threads/BBB` → `BBB`.
fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Decode a Chat app webhook body into normalized events.
///
/// `verification_token` of `None` skips the token check (the transport
/// layer may verify by other means).
pub fn parse_webhook(
    body: &[u8],
    verification_token: Option<&str>,
) -> Result<Vec<ChatEvent>, AdapterError> {
    let payload: ChatEventPayload = serde_json::from_slice(body).map_err(invalid)?;

    if let Some(expected) = verification_token {
        verify_token(expected, payload.token.as_deref())?;
    }

    match payload.kind.as_str() {
        "MESSAGE" => {
            let raw = payload
                .message
                .ok_or_else(|| invalid("MESSAGE event without message"))?;
            let message = parse_chat_message(&raw)?;
            let mentioned = raw
                .get("annotations")
                .and_then(|a| a.as_array())
                .is_some_and(|annotations| {
                    annotations.iter().any(|a| {
                        a.get("type").and_then(|t| t.as_str()) == Some("USER_MENTION")
                    })
                });
            Ok(vec![if mentioned {
                ChatEvent::Mention(message)
            } else {
                ChatEvent::Message(message)
            }])
        }
        other => {
            // ADDED_TO_SPACE, REMOVED_FROM_SPACE, CARD_CLICKED, …
            log::debug!("ignoring google chat event of type '{other}'");
            Ok(Vec::new())
        }
    }
}

/// Normalize one Chat message object.
pub fn parse_chat_message(raw: &serde_json::Value) -> Result<Message, AdapterError> {
    let message: ChatMessage = serde_json::from_value(raw.clone()).map_err(invalid)?;
    let thread = GoogleChatThread {
        space: last_segment(&message.space.name).to_string(),
        thread: last_segment(&message.thread.name).to_string(),
    };
    let timestamp = message
        .create_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let user_id = last_segment(&message.sender.name).to_string();
    Ok(Message {
        id: last_segment(&message.name).to_string(),
        thread_id: thread.encode(),
        author: Author {
            user_name: message
                .sender
                .display_name
                .clone()
                .unwrap_or_else(|| user_id.clone()),
            display_name: message.sender.display_name,
            user_id,
            bot: message.sender.kind.as_deref() == Some("BOT"),
        },
        text: message.text.unwrap_or_default(),
        formatted: None,
        attachments: Vec::new(),
        timestamp,
        edited: message.last_update_time.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(token: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "MESSAGE",
            "token": token,
            "message": {
                "name": "spaces/AAA/messages/MMM",
                "sender": {
                    "name": "users/12345",
                    "displayName": "Ada",
                    "type": "HUMAN"
                },
                "text": "@palaver status please",
                "thread": {"name": "spaces/AAA/threads/TTT"},
                "space": {"name": "spaces/AAA"},
                "annotations": [{"type": "USER_MENTION"}],
                "createTime": "2024-03-09T12:00:00Z"
            }
        })
    }

    #[test]
    fn valid_token_passes() {
        let body = serde_json::to_vec(&sample_event("shh")).unwrap();
        assert!(parse_webhook(&body, Some("shh")).is_ok());
    }

    #[test]
    fn wrong_token_is_an_authentication_error() {
        let body = serde_json::to_vec(&sample_event("wrong")).unwrap();
        let err = parse_webhook(&body, Some("shh")).unwrap_err();
        assert_eq!(err.code(), "AUTH_FAILED");
    }

    #[test]
    fn missing_token_is_an_authentication_error() {
        let body = serde_json::json!({"type": "MESSAGE", "message": {}});
        let err = parse_webhook(&serde_json::to_vec(&body).unwrap(), Some("shh")).unwrap_err();
        assert_eq!(err.code(), "AUTH_FAILED");
    }

    #[test]
    fn mentioned_message_is_a_mention_event() {
        let body = serde_json::to_vec(&sample_event("shh")).unwrap();
        let events = parse_webhook(&body, Some("shh")).unwrap();
        match &events[0] {
            ChatEvent::Mention(m) => {
                assert_eq!(m.thread_id.as_str(), "googlechat:AAA:TTT");
                assert_eq!(m.id, "MMM");
                assert_eq!(m.author.user_id, "12345");
                assert_eq!(m.author.user_name, "Ada");
                assert!(!m.author.bot);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unmentioned_message_is_a_plain_message() {
        let mut event = sample_event("shh");
        event["message"]["annotations"] = serde_json::json!([]);
        let events = parse_webhook(&serde_json::to_vec(&event).unwrap(), Some("shh")).unwrap();
        assert!(matches!(&events[0], ChatEvent::Message(_)));
    }

    #[test]
    fn non_message_events_are_ignored() {
        let body = serde_json::json!({"type": "ADDED_TO_SPACE", "token": "shh"});
        let events = parse_webhook(&serde_json::to_vec(&body).unwrap(), Some("shh")).unwrap();
        assert!(events.is_empty());
    }
}
