//! The Slack adapter: thread-id codec and outbound operations.

use async_trait::async_trait;

use palaver_core::adapter::ChatAdapter;
use palaver_core::emoji;
use palaver_core::error::AdapterError;
use palaver_core::thread_id::ThreadId;
use palaver_core::types::{Message, Outgoing};

use crate::client::SlackClient;
use crate::ingress;

pub const ADAPTER_NAME: &str = "slack";

/// Coordinates of a Slack thread: the channel and the root message
/// timestamp that anchors the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackThread {
    pub channel: String,
    pub thread_ts: String,
}

impl SlackThread {
    pub fn encode(&self) -> ThreadId {
        // Channel ids and timestamps never contain ':', so the join is
        // unambiguous.
        ThreadId::new(ADAPTER_NAME, &format!("{}:{}", self.channel, self.thread_ts))
            .expect("slack coordinates are always a valid thread id")
    }

    pub fn decode(raw: &str) -> Result<Self, AdapterError> {
        let id = ThreadId::parse(raw).map_err(|e| AdapterError::validation(ADAPTER_NAME, e))?;
        Self::from_thread_id(&id)
    }

    pub fn from_thread_id(id: &ThreadId) -> Result<Self, AdapterError> {
        if id.adapter() != ADAPTER_NAME {
            return Err(AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{id}' does not belong to the slack adapter"),
            ));
        }
        let (channel, thread_ts) = id.opaque().split_once(':').ok_or_else(|| {
            AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{id}' is missing the thread timestamp"),
            )
        })?;
        if channel.is_empty() || thread_ts.is_empty() {
            return Err(AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{id}' has empty slack coordinates"),
            ));
        }
        Ok(Self {
            channel: channel.to_string(),
            thread_ts: thread_ts.to_string(),
        })
    }
}

pub struct SlackAdapter {
    client: SlackClient,
    bot_user_id: Option<String>,
}

impl SlackAdapter {
    pub fn new(bot_token: String, bot_user_id: Option<String>) -> Self {
        Self {
            client: SlackClient::new(bot_token),
            bot_user_id,
        }
    }
}

#[async_trait]
impl ChatAdapter for SlackAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.clone()
    }

    fn decode_thread_id(&self, raw: &str) -> Result<ThreadId, AdapterError> {
        Ok(SlackThread::decode(raw)?.encode())
    }

    fn parse_message(&self, raw: &serde_json::Value) -> Result<Message, AdapterError> {
        ingress::parse_message_event(raw)
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        content: &Outgoing,
    ) -> Result<String, AdapterError> {
        let coords = SlackThread::from_thread_id(thread)?;
        self.client
            .post_message(&coords.channel, Some(&coords.thread_ts), &content.text)
            .await
    }

    async fn edit_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
        content: &Outgoing,
    ) -> Result<(), AdapterError> {
        let coords = SlackThread::from_thread_id(thread)?;
        self.client
            .update_message(&coords.channel, message_id, &content.text)
            .await
    }

    async fn delete_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
    ) -> Result<(), AdapterError> {
        let coords = SlackThread::from_thread_id(thread)?;
        self.client
            .delete_message(&coords.channel, message_id)
            .await
    }

    async fn start_typing(&self, thread: &ThreadId) -> Result<(), AdapterError> {
        // The Web API has no typing indicator for bot tokens; the call is
        // accepted and does nothing.
        log::debug!("start_typing is a no-op on slack ({thread})");
        Ok(())
    }

    async fn add_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji_key: &str,
    ) -> Result<(), AdapterError> {
        let coords = SlackThread::from_thread_id(thread)?;
        self.client
            .add_reaction(&coords.channel, message_id, emoji::to_slack_name(emoji_key))
            .await
    }

    async fn remove_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji_key: &str,
    ) -> Result<(), AdapterError> {
        let coords = SlackThread::from_thread_id(thread)?;
        self.client
            .remove_reaction(&coords.channel, message_id, emoji::to_slack_name(emoji_key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips() {
        let coords = SlackThread {
            channel: "C123".into(),
            thread_ts: "1710000000.1234".into(),
        };
        let id = coords.encode();
        assert_eq!(id.as_str(), "slack:C123:1710000000.1234");
        assert_eq!(SlackThread::from_thread_id(&id).unwrap(), coords);
        assert_eq!(SlackThread::decode(id.as_str()).unwrap(), coords);
    }

    #[test]
    fn decode_rejects_foreign_prefix() {
        let err = SlackThread::decode("linear:0b5c1a2e").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.adapter, "slack");
    }

    #[test]
    fn decode_rejects_missing_timestamp() {
        let err = SlackThread::decode("slack:C123").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = SlackThread::decode("slack:C123:").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn decode_rejects_empty_opaque() {
        let err = SlackThread::decode("slack:").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
