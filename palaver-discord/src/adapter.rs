//! The Discord adapter: thread-id codec and outbound operations.
//!
//! A Discord "thread" in the runtime's sense is the channel's message
//! tree, so the coordinates are just the channel snowflake.

use async_trait::async_trait;

use palaver_core::adapter::{ChatAdapter, GatewayListener};
use palaver_core::error::AdapterError;
use palaver_core::thread_id::ThreadId;
use palaver_core::types::{Message, Outgoing};

use crate::client::DiscordClient;
use crate::gateway::DiscordGateway;
use crate::ingress;

pub const ADAPTER_NAME: &str = "discord";

pub struct DiscordAdapter {
    client: DiscordClient,
    bot_user_id: Option<String>,
    gateway: Option<DiscordGateway>,
}

impl DiscordAdapter {
    pub fn new(bot_token: String, bot_user_id: Option<String>) -> Self {
        Self {
            client: DiscordClient::new(bot_token),
            bot_user_id,
            gateway: None,
        }
    }

    /// Attach the gateway listener capability; `forward_url` is where
    /// dispatch frames are POSTed.
    pub fn with_gateway(mut self, bot_token: String, forward_url: Option<String>) -> Self {
        self.gateway = Some(DiscordGateway::new(bot_token, forward_url));
        self
    }

    pub fn channel_of(thread: &ThreadId) -> Result<String, AdapterError> {
        if thread.adapter() != ADAPTER_NAME {
            return Err(AdapterError::validation(
                ADAPTER_NAME,
                format!("thread id '{thread}' does not belong to the discord adapter"),
            ));
        }
        let channel = thread.opaque();
        if channel.is_empty() || !channel.chars().all(|c| c.is_ascii_digit()) {
            return Err(AdapterError::validation(
                ADAPTER_NAME,
                format!("'{channel}' is not a channel snowflake"),
            ));
        }
        Ok(channel.to_string())
    }

    pub fn encode_channel(channel: &str) -> Result<ThreadId, AdapterError> {
        let id = ThreadId::new(ADAPTER_NAME, channel)
            .map_err(|e| AdapterError::validation(ADAPTER_NAME, e))?;
        // Validate the snowflake shape on the way in, too.
        Self::channel_of(&id)?;
        Ok(id)
    }
}

#[async_trait]
impl ChatAdapter for DiscordAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.clone()
    }

    fn decode_thread_id(&self, raw: &str) -> Result<ThreadId, AdapterError> {
        let id = ThreadId::parse(raw).map_err(|e| AdapterError::validation(ADAPTER_NAME, e))?;
        Self::channel_of(&id)?;
        Ok(id)
    }

    fn parse_message(&self, raw: &serde_json::Value) -> Result<Message, AdapterError> {
        ingress::parse_message(raw, false)
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        content: &Outgoing,
    ) -> Result<String, AdapterError> {
        let channel = Self::channel_of(thread)?;
        self.client.create_message(&channel, &content.text).await
    }

    async fn edit_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
        content: &Outgoing,
    ) -> Result<(), AdapterError> {
        let channel = Self::channel_of(thread)?;
        self.client
            .edit_message(&channel, message_id, &content.text)
            .await
    }

    async fn delete_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
    ) -> Result<(), AdapterError> {
        let channel = Self::channel_of(thread)?;
        self.client.delete_message(&channel, message_id).await
    }

    async fn start_typing(&self, thread: &ThreadId) -> Result<(), AdapterError> {
        let channel = Self::channel_of(thread)?;
        self.client.trigger_typing(&channel).await
    }

    async fn add_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError> {
        let channel = Self::channel_of(thread)?;
        self.client.add_reaction(&channel, message_id, emoji).await
    }

    async fn remove_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError> {
        let channel = Self::channel_of(thread)?;
        self.client
            .remove_reaction(&channel, message_id, emoji)
            .await
    }

    fn gateway(&self) -> Option<&dyn GatewayListener> {
        self.gateway.as_ref().map(|g| g as &dyn GatewayListener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips() {
        let id = DiscordAdapter::encode_channel("123456789012345678").unwrap();
        assert_eq!(id.as_str(), "discord:123456789012345678");
        assert_eq!(
            DiscordAdapter::channel_of(&id).unwrap(),
            "123456789012345678"
        );
    }

    #[test]
    fn decode_rejects_foreign_and_malformed_ids() {
        let adapter = DiscordAdapter::new("t".into(), None);
        assert_eq!(
            adapter
                .decode_thread_id("slack:C1:1710000000.1")
                .unwrap_err()
                .code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            adapter.decode_thread_id("discord:not-digits").unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            adapter.decode_thread_id("discord:").unwrap_err().code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn gateway_capability_is_present_only_when_attached() {
        let plain = DiscordAdapter::new("t".into(), None);
        assert!(plain.gateway().is_none());

        let with_gateway = DiscordAdapter::new("t".into(), None)
            .with_gateway("t".into(), Some("https://bot.example.com/webhook/discord".into()));
        assert!(with_gateway.gateway().is_some());
    }
}
