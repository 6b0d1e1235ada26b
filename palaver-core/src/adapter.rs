//! The platform adapter contract.
//!
//! Each chat platform integration implements [`ChatAdapter`]. The bot holds
//! adapters behind `Arc<dyn ChatAdapter>` keyed by [`ChatAdapter::name`],
//! which doubles as the thread-id prefix and the `adapter` field of every
//! error the integration raises.
//!
//! Event classification happens in the adapter: it knows how its platform
//! expresses "the bot was mentioned" (a dedicated event type on Slack, a
//! mentions array on Discord, an `@name` in a comment body on Linear) and
//! tags the normalized event accordingly. The bot core trusts the tag.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;
use crate::thread_id::ThreadId;
use crate::types::{Message, Outgoing};

/// Capabilities every platform adapter must provide.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Stable short name: the thread-id prefix and error tag.
    fn name(&self) -> &str;

    /// The platform user id of the bot itself, when known.
    ///
    /// Used by the dispatcher to drop the bot's own messages.
    fn bot_user_id(&self) -> Option<String> {
        None
    }

    /// Validate and decode a raw thread-id string owned by this adapter.
    ///
    /// Fails with `Validation` when the prefix is not `<name>:` or the
    /// remainder is malformed for this platform.
    fn decode_thread_id(&self, raw: &str) -> Result<ThreadId, AdapterError>;

    /// Normalize a single raw platform message object.
    fn parse_message(&self, raw: &serde_json::Value) -> Result<Message, AdapterError>;

    /// Post a message to a thread; returns the platform message id.
    async fn post_message(
        &self,
        thread: &ThreadId,
        content: &Outgoing,
    ) -> Result<String, AdapterError>;

    async fn edit_message(
        &self,
        thread: &ThreadId,
        message_id: &str,
        content: &Outgoing,
    ) -> Result<(), AdapterError>;

    async fn delete_message(&self, thread: &ThreadId, message_id: &str)
    -> Result<(), AdapterError>;

    /// Show a typing indicator. Platforms without one treat this as a
    /// no-op rather than an error.
    async fn start_typing(&self, thread: &ThreadId) -> Result<(), AdapterError>;

    /// Add a reaction identified by its normalized emoji key.
    async fn add_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError>;

    async fn remove_reaction(
        &self,
        thread: &ThreadId,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError>;

    /// Gateway capability, discovered by presence. Only adapters that keep
    /// a long-running listener socket (Discord) return one.
    fn gateway(&self) -> Option<&dyn GatewayListener> {
        None
    }
}

/// A long-running event listener held open by an adapter.
#[async_trait]
pub trait GatewayListener: Send + Sync {
    /// Run the listener for at most `duration`, or until `cancel` fires.
    ///
    /// Implementations must propagate cancellation to every wait inside
    /// and return promptly once it fires.
    async fn run(&self, duration: Duration, cancel: CancellationToken) -> Result<(), AdapterError>;
}
