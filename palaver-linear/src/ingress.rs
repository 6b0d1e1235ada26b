//! Linear webhook ingress: HMAC signature verification and normalization
//! of comment and reaction events.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use palaver_core::emoji;
use palaver_core::error::AdapterError;
use palaver_core::thread_id::ThreadId;
use palaver_core::types::{Author, ChatEvent, Message, ReactionEvent};

use crate::adapter::ADAPTER_NAME;

/// Verify the `linear-signature` header: a hex HMAC-SHA256 of the raw
/// body. Comparison is constant-time via `Mac::verify_slice`.
pub fn verify_signature(
    signing_secret: &str,
    signature: &str,
    body: &[u8],
) -> Result<(), AdapterError> {
    let expected =
        hex::decode(signature).map_err(|_| AdapterError::authentication(ADAPTER_NAME))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC accepts any key size");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| AdapterError::authentication(ADAPTER_NAME))
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    action: String,
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentData {
    id: String,
    #[serde(default)]
    body: Option<String>,
    issue_id: Option<String>,
    #[serde(default)]
    user: Option<UserData>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    edited_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserData {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    is_me: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReactionData {
    emoji: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    comment: Option<CommentRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRef {
    id: String,
    #[serde(default)]
    issue_id: Option<String>,
}

fn invalid(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::validation(ADAPTER_NAME, format!("malformed linear payload: {e}"))
}

fn issue_thread(issue_id: &str) -> Result<ThreadId, AdapterError> {
    ThreadId::new(ADAPTER_NAME, issue_id).map_err(invalid)
}

/// Decode a webhook body into normalized events.
///
/// `bot_name` is matched (as `@name`) against comment bodies to classify
/// mentions.
pub fn parse_webhook(body: &[u8], bot_name: &str) -> Result<Vec<ChatEvent>, AdapterError> {
    let payload: WebhookPayload = serde_json::from_slice(body).map_err(invalid)?;

    let result = match (payload.kind.as_str(), payload.action.as_str()) {
        ("Comment", "create") => comment_event(&payload.data, bot_name, false).map(|e| vec![e]),
        ("Comment", "update") => comment_event(&payload.data, bot_name, true).map(|e| vec![e]),
        ("Reaction", "create") => reaction_event(&payload.data, true),
        ("Reaction", "remove") => reaction_event(&payload.data, false),
        (kind, action) => {
            log::debug!("ignoring linear webhook {kind}/{action}");
            Ok(Vec::new())
        }
    };
    match result {
        Ok(events) => Ok(events),
        Err(e) => {
            log::warn!("failed to normalize linear webhook: {e}");
            Ok(Vec::new())
        }
    }
}

fn comment_event(
    data: &serde_json::Value,
    bot_name: &str,
    edited: bool,
) -> Result<ChatEvent, AdapterError> {
    let message = parse_comment(data, edited)?;
    let needle = format!("@{}", bot_name.to_lowercase());
    let mentioned = message.text.to_lowercase().contains(&needle);
    Ok(if mentioned && !edited {
        ChatEvent::Mention(message)
    } else {
        ChatEvent::Message(message)
    })
}

/// Normalize one comment object.
pub fn parse_comment(data: &serde_json::Value, edited: bool) -> Result<Message, AdapterError> {
    let comment: CommentData = serde_json::from_value(data.clone()).map_err(invalid)?;
    let issue_id = comment
        .issue_id
        .ok_or_else(|| invalid("comment without issueId"))?;
    let (user_id, user_name, display_name, is_me) = match comment.user {
        Some(user) => {
            let name = user.name.unwrap_or_else(|| user.id.clone());
            (user.id, name, user.display_name, user.is_me.unwrap_or(false))
        }
        None => {
            let id = comment
                .user_id
                .ok_or_else(|| invalid("comment without user"))?;
            (id.clone(), id, None, false)
        }
    };
    let timestamp = comment
        .created_at
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    Ok(Message {
        id: comment.id,
        thread_id: issue_thread(&issue_id)?,
        author: Author {
            user_id,
            user_name,
            display_name,
            // `isMe` marks comments the authenticated app itself wrote.
            bot: is_me,
        },
        text: comment.body.unwrap_or_default(),
        formatted: None,
        attachments: Vec::new(),
        timestamp,
        edited: edited || comment.edited_at.is_some(),
    })
}

fn reaction_event(data: &serde_json::Value, added: bool) -> Result<Vec<ChatEvent>, AdapterError> {
    let reaction: ReactionData = serde_json::from_value(data.clone()).map_err(invalid)?;
    let Some(comment) = reaction.comment else {
        // Reactions on documents or project updates have no thread here.
        log::debug!("ignoring linear reaction outside a comment");
        return Ok(Vec::new());
    };
    let Some(issue_id) = comment.issue_id else {
        log::debug!("ignoring linear reaction without an issue id");
        return Ok(Vec::new());
    };
    Ok(vec![ChatEvent::Reaction(ReactionEvent {
        adapter: ADAPTER_NAME.to_string(),
        thread_id: issue_thread(&issue_id)?,
        message_id: comment.id,
        user_id: reaction.user_id.unwrap_or_default(),
        emoji: emoji::normalize(&reaction.emoji),
        raw_emoji: reaction.emoji,
        added,
    })])
}
