//! The thread façade handed to handlers.
//!
//! A `Thread` is a short-lived handle bound to one `(adapter, thread id)`
//! pair. Handlers receive a fresh instance per delivery and there are no
//! identity guarantees across deliveries. It carries lookup handles only:
//! the bot keeps ownership of the adapters and the state adapter.

use std::sync::Arc;

use crate::adapter::ChatAdapter;
use crate::error::AdapterError;
use crate::state::StateAdapter;
use crate::state::StateError;
use crate::thread_id::ThreadId;
use crate::types::Outgoing;

#[derive(Clone)]
pub struct Thread {
    thread_id: ThreadId,
    adapter: Arc<dyn ChatAdapter>,
    state: Arc<dyn StateAdapter>,
}

impl Thread {
    pub fn new(
        thread_id: ThreadId,
        adapter: Arc<dyn ChatAdapter>,
        state: Arc<dyn StateAdapter>,
    ) -> Self {
        Self {
            thread_id,
            adapter,
            state,
        }
    }

    pub fn id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// The platform adapter this thread belongs to.
    pub fn adapter(&self) -> &Arc<dyn ChatAdapter> {
        &self.adapter
    }

    /// Mark this thread as attended: subsequent non-bot messages in it are
    /// delivered to subscribed-message handlers.
    pub async fn subscribe(&self) -> Result<(), StateError> {
        self.state.subscribe(&self.thread_id).await
    }

    pub async fn unsubscribe(&self) -> Result<(), StateError> {
        self.state.unsubscribe(&self.thread_id).await
    }

    pub async fn is_subscribed(&self) -> Result<bool, StateError> {
        self.state.is_subscribed(&self.thread_id).await
    }

    /// Post into the thread; the returned handle can edit or delete the
    /// message later.
    pub async fn post(&self, content: impl Into<Outgoing>) -> Result<PostedMessage, AdapterError> {
        let content = content.into();
        let id = self
            .adapter
            .post_message(&self.thread_id, &content)
            .await?;
        Ok(PostedMessage {
            id,
            thread_id: self.thread_id.clone(),
            adapter: Arc::clone(&self.adapter),
        })
    }

    pub async fn start_typing(&self) -> Result<(), AdapterError> {
        self.adapter.start_typing(&self.thread_id).await
    }

    /// React to a message in this thread with a normalized emoji key.
    pub async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<(), AdapterError> {
        self.adapter
            .add_reaction(&self.thread_id, message_id, emoji)
            .await
    }

    pub async fn remove_reaction(&self, message_id: &str, emoji: &str) -> Result<(), AdapterError> {
        self.adapter
            .remove_reaction(&self.thread_id, message_id, emoji)
            .await
    }
}

/// Handle to a message the bot posted.
#[derive(Clone)]
pub struct PostedMessage {
    id: String,
    thread_id: ThreadId,
    adapter: Arc<dyn ChatAdapter>,
}

impl PostedMessage {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn edit(&self, content: impl Into<Outgoing>) -> Result<(), AdapterError> {
        self.adapter
            .edit_message(&self.thread_id, &self.id, &content.into())
            .await
    }

    pub async fn delete(&self) -> Result<(), AdapterError> {
        self.adapter.delete_message(&self.thread_id, &self.id).await
    }
}
