//! Normalized event and message types.
//!
//! Adapters translate raw platform payloads into these types; the bot core
//! and user handlers never see platform-specific shapes. A `Message` is
//! built once per inbound event and never mutated or stored by the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::thread_id::ThreadId;

/// The author of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// True when the platform marks the author as a bot account.
    #[serde(default)]
    pub bot: bool,
}

/// A span of inline content inside a paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Span {
    Text { text: String },
    Link { url: String, label: Option<String> },
    Mention { user_id: String },
}

/// A block in the abstract formatted-text tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph { spans: Vec<Span> },
    Code {
        language: Option<String>,
        content: String,
    },
}

/// Attachment payload shapes an adapter can normalize without fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentData {
    Bytes { bytes: Vec<u8> },
    Base64 { text: String },
    Url { url: String },
}

/// A normalized attachment on an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub data: AttachmentData,
}

/// A normalized inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Platform message id, unique within the thread's platform.
    pub id: String,
    pub thread_id: ThreadId,
    pub author: Author,
    /// Plain text with mentions resolved to names or left as platform
    /// tokens, at the adapter's discretion.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<Vec<Block>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
}

/// A normalized reaction change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub adapter: String,
    pub thread_id: ThreadId,
    pub message_id: String,
    pub user_id: String,
    /// Normalized key (see [`crate::emoji`]).
    pub emoji: String,
    /// The platform's original emoji string.
    pub raw_emoji: String,
    /// True for an added reaction, false for a removed one.
    pub added: bool,
}

/// A normalized inbound event, tagged with how the adapter classified it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The bot was mentioned.
    Mention(Message),
    /// A message in a thread the bot can see.
    Message(Message),
    /// A reaction was added or removed.
    Reaction(ReactionEvent),
}

impl ChatEvent {
    pub fn thread_id(&self) -> &ThreadId {
        match self {
            Self::Mention(m) | Self::Message(m) => &m.thread_id,
            Self::Reaction(r) => &r.thread_id,
        }
    }

    /// Name of the adapter this event belongs to.
    pub fn adapter(&self) -> &str {
        self.thread_id().adapter()
    }
}

/// Outbound message content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outgoing {
    pub text: String,
    pub blocks: Option<Vec<Block>>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
        }
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(thread: &str) -> Message {
        Message {
            id: "m1".into(),
            thread_id: ThreadId::parse(thread).unwrap(),
            author: Author {
                user_id: "U1".into(),
                user_name: "ada".into(),
                display_name: None,
                bot: false,
            },
            text: "hello".into(),
            formatted: None,
            attachments: Vec::new(),
            timestamp: Utc::now(),
            edited: false,
        }
    }

    #[test]
    fn event_adapter_comes_from_thread_id() {
        let event = ChatEvent::Message(message("slack:C1:1.2"));
        assert_eq!(event.adapter(), "slack");
        assert_eq!(event.thread_id().as_str(), "slack:C1:1.2");
    }

    #[test]
    fn reaction_event_carries_both_emoji_forms() {
        let event = ChatEvent::Reaction(ReactionEvent {
            adapter: "slack".into(),
            thread_id: ThreadId::parse("slack:C1:1.2").unwrap(),
            message_id: "1.3".into(),
            user_id: "U2".into(),
            emoji: "thumbs_up".into(),
            raw_emoji: "+1".into(),
            added: true,
        });
        match event {
            ChatEvent::Reaction(r) => {
                assert_eq!(r.emoji, "thumbs_up");
                assert_eq!(r.raw_emoji, "+1");
            }
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn message_serde_round_trip() {
        let msg = message("linear:0b5c1a2e-0000-4000-8000-000000000000");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn outgoing_from_str() {
        let out: Outgoing = "hi there".into();
        assert_eq!(out.text, "hi there");
        assert!(out.blocks.is_none());
    }
}
