//! The Linear adapter: thread-id codec and outbound operations.

use async_trait::async_trait;

use palaver_core::adapter::ChatAdapter;
use palaver_core::error::AdapterError;
use palaver_core::thread_id::ThreadId;
use palaver_core::types::{Message, Outgoing};

use crate::client::LinearClient;
use crate::ingress;

pub const ADAPTER_NAME: &str = "linear";

pub struct LinearAdapter {
    client: LinearClient,
    /// Display name used to spot `@name` mentions in comment bodies.
    bot_name: String,
}

impl LinearAdapter {
    pub fn new(api_key: String, bot_name: String) -> Self {
        Self {
            client: LinearClient::new(api_key),
            bot_name,
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Extract and validate the issue UUID from a thread id.
    pub fn issue_of(thread: &ThreadId) -> Result<String, AdapterError> {
        if thread.adapter() != ADAPTER_NAME {
            return Err(AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{thread}' does not belong to the linear adapter"),
            ));
        }
        let issue = thread.opaque();
        uuid::Uuid::parse_str(issue).map_err(|_| {
            AdapterError::validation(
                ADAPTER_NAME,
                format!("'{issue}' is not an issue uuid"),
            )
        })?;
        Ok(issue.to_string())
    }

    pub fn encode_issue(issue_id: &str) -> Result<ThreadId, AdapterError> {
        uuid::Uuid::parse_str(issue_id).map_err(|_| {
            AdapterError::validation(
                ADAPTER_NAME,
                format!("'{issue_id}' is not an issue uuid"),
            )
        })?;
        ThreadId::new(ADAPTER_NAME, issue_id)
            .map_err(|e| AdapterError::validation(ADAPTER_NAME, e))
    }
}

#[async_trait]
impl ChatAdapter for LinearAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn decode_thread_id(&self, raw: &str) -> Result<ThreadId, AdapterError> {
        let id = ThreadId::parse(raw).map_err(|e| AdapterError::validation(ADAPTER_NAME, e))?;
        Self::issue_of(&id)?;
        Ok(id)
    }

    fn parse_message(&self, raw: &serde_json::Value) -> Result<Message, AdapterError> {
        ingress::parse_comment(raw, false)
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        content: &Outgoing,
    ) -> Result<String, AdapterError> {
        let issue = Self::issue_of(thread)?;
        self.client.create_comment(&issue, &content.text).await
    }

    async fn edit_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
        content: &Outgoing,
    ) -> Result<(), AdapterError> {
        Self::issue_of(thread)?;
        self.client.update_comment(message_id, &content.text).await
    }

    async fn delete_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
    ) -> Result<(), AdapterError> {
        Self::issue_of(thread)?;
        self.client.delete_comment(message_id).await
    }

    async fn start_typing(&self, thread: &ThreadId) -> Result<(), AdapterError> {
        // Issue trackers have no typing indicator.
        log::debug!("start_typing is a no-op on linear ({thread})");
        Ok(())
    }

    async fn add_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError> {
        Self::issue_of(thread)?;
        self.client.create_reaction(message_id, emoji).await
    }

    async fn remove_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError> {
        Self::issue_of(thread)?;
        self.client.delete_reaction(message_id, emoji).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUE: &str = "0b5c1a2e-7c39-4b6a-9d5f-3a1f2e4b6c8d";

    #[test]
    fn codec_round_trips() {
        let id = LinearAdapter::encode_issue(ISSUE).unwrap();
        assert_eq!(id.as_str(), format!("linear:{ISSUE}"));
        assert_eq!(LinearAdapter::issue_of(&id).unwrap(), ISSUE);
    }

    #[test]
    fn decoding_a_slack_id_through_linear_fails() {
        let adapter = LinearAdapter::new("k".into(), "palaver".into());
        let err = adapter.decode_thread_id("slack:C1:1").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.adapter, "linear");
    }

    #[test]
    fn decoding_an_empty_remainder_fails() {
        let adapter = LinearAdapter::new("k".into(), "palaver".into());
        let err = adapter.decode_thread_id("linear:").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn decoding_a_non_uuid_remainder_fails() {
        let adapter = LinearAdapter::new("k".into(), "palaver".into());
        let err = adapter.decode_thread_id("linear:ISSUE-42").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
