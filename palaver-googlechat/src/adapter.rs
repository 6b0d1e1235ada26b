//! The Google Chat adapter: thread-id codec and outbound operations.

use async_trait::async_trait;

use palaver_core::adapter::ChatAdapter;
use palaver_core::error::AdapterError;
use palaver_core::thread_id::ThreadId;
use palaver_core::types::{Message, Outgoing};

use crate::client::GoogleChatClient;
use crate::ingress;

pub const ADAPTER_NAME: &str = "googlechat";

/// Coordinates of a Google Chat thread: the space id and the thread id,
/// without their `spaces/` / `threads/` resource prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleChatThread {
    pub space: String,
    pub thread: String,
}

impl GoogleChatThread {
    pub fn encode(&self) -> ThreadId {
        ThreadId::new(ADAPTER_NAME, &format!("{}:{}", self.space, self.thread))
            .expect("google chat coordinates are always a valid thread id")
    }

    pub fn from_thread_id(id: &ThreadId) -> Result<Self, AdapterError> {
        if id.adapter() != ADAPTER_NAME {
            return Err(AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{id}' does not belong to the googlechat adapter"),
            ));
        }
        let (space, thread) = id.opaque().split_once(':').ok_or_else(|| {
            AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{id}' is missing the thread segment"),
            )
        })?;
        if space.is_empty() || thread.is_empty() {
            return Err(AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{id}' has empty google chat coordinates"),
            ));
        }
        Ok(Self {
            space: space.to_string(),
            thread: thread.to_string(),
        })
    }
}

pub struct GoogleChatAdapter {
    client: GoogleChatClient,
    bot_user_id: Option<String>,
}

impl GoogleChatAdapter {
    pub fn new(api_token: String, bot_user_id: Option<String>) -> Self {
        Self {
            client: GoogleChatClient::new(api_token),
            bot_user_id,
        }
    }
}

#[async_trait]
impl ChatAdapter for GoogleChatAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.clone()
    }

    fn decode_thread_id(&self, raw: &str) -> Result<ThreadId, AdapterError> {
        let id = ThreadId::parse(raw).map_err(|e| AdapterError::validation(ADAPTER_NAME, e))?;
        Ok(GoogleChatThread::from_thread_id(&id)?.encode())
    }

    fn parse_message(&self, raw: &serde_json::Value) -> Result<Message, AdapterError> {
        ingress::parse_chat_message(raw)
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        content: &Outgoing,
    ) -> Result<String, AdapterError> {
        let coords = GoogleChatThread::from_thread_id(thread)?;
        self.client
            .create_message(&coords.space, &coords.thread, &content.text)
            .await
    }

    async fn edit_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
        content: &Outgoing,
    ) -> Result<(), AdapterError> {
        let coords = GoogleChatThread::from_thread_id(thread)?;
        self.client
            .update_message(&coords.space, message_id, &content.text)
            .await
    }

    async fn delete_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
    ) -> Result<(), AdapterError> {
        let coords = GoogleChatThread::from_thread_id(thread)?;
        self.client.delete_message(&coords.space, message_id).await
    }

    async fn start_typing(&self, thread: &ThreadId) -> Result<(), AdapterError> {
        // The Chat API exposes no typing indicator for apps.
        log::debug!("start_typing is a no-op on google chat ({thread})");
        Ok(())
    }

    async fn add_reaction(
        &self,
        _thread: &ThreadId,
        _message_id: &str,
        _emoji: &str,
    ) -> Result<(), AdapterError> {
        // Service-account Chat apps cannot create reactions; surface the
        // limitation as a typed error instead of a silent no-op.
        Err(AdapterError::permission(
            ADAPTER_NAME,
            "add reaction",
            Some("user-scoped chat.messages.reactions.create".into()),
        ))
    }

    async fn remove_reaction(
        &self,
        _thread: &ThreadId,
        _message_id: &str,
        _emoji: &str,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::permission(
            ADAPTER_NAME,
            "remove reaction",
            Some("user-scoped chat.messages.reactions.create".into()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips() {
        let coords = GoogleChatThread {
            space: "AAA123".into(),
            thread: "BBB456".into(),
        };
        let id = coords.encode();
        assert_eq!(id.as_str(), "googlechat:AAA123:BBB456");
        assert_eq!(GoogleChatThread::from_thread_id(&id).unwrap(), coords);
    }

    #[test]
    fn decode_rejects_foreign_and_malformed_ids() {
        let adapter = GoogleChatAdapter::new("t".into(), None);
        assert_eq!(
            adapter
                .decode_thread_id("slack:C1:1710000000.1")
                .unwrap_err()
                .code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            adapter
                .decode_thread_id("googlechat:only-space")
                .unwrap_err()
                .code(),
            "VALIDATION_ERROR"
        );
    }

    #[tokio::test]
    async fn reactions_are_refused_with_permission() {
        let adapter = GoogleChatAdapter::new("t".into(), None);
        let thread = GoogleChatThread {
            space: "AAA".into(),
            thread: "BBB".into(),
        }
        .encode();

        let err = adapter.add_reaction(&thread, "m1", "thumbs_up").await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
        assert_eq!(err.adapter, "googlechat");

        let err = adapter
            .remove_reaction(&thread, "m1", "thumbs_up")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }
}
