//! The bot dispatch core.
//!
//! A [`Bot`] owns the platform adapters and the state adapter, keeps the
//! handler registry, and routes every normalized inbound event to the
//! handlers that match it. Handlers for the same thread are serialized
//! through the state adapter's per-thread lock; callers that want
//! concurrency across threads spawn `dispatch` per event (the webhook
//! routes do).

use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::adapter::ChatAdapter;
use crate::emoji;
use crate::error::AdapterError;
use crate::state::StateAdapter;
use crate::thread::Thread;
use crate::types::{Author, ChatEvent, Message, ReactionEvent};

/// Per-thread lock TTL; extended at half-interval while handlers run.
const LOCK_TTL: Duration = Duration::from_secs(30);

pub type HandlerError = Box<dyn StdError + Send + Sync>;
type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;
type MessageCallback = Arc<dyn Fn(Thread, Message) -> HandlerFuture + Send + Sync>;
type ReactionCallback = Arc<dyn Fn(Thread, ReactionEvent) -> HandlerFuture + Send + Sync>;

enum Handler {
    Mention(MessageCallback),
    Subscribed(MessageCallback),
    Pattern(Regex, MessageCallback),
    Reaction(HashSet<String>, ReactionCallback),
}

impl Handler {
    fn label(&self) -> &'static str {
        match self {
            Self::Mention(_) => "mention",
            Self::Subscribed(_) => "subscribed",
            Self::Pattern(..) => "pattern",
            Self::Reaction(..) => "reaction",
        }
    }
}

/// The chatbot runtime instance.
pub struct Bot {
    adapters: HashMap<String, Arc<dyn ChatAdapter>>,
    state: Arc<dyn StateAdapter>,
    user_name: String,
    handlers: Vec<Handler>,
    initialized: tokio::sync::Mutex<bool>,
}

impl Bot {
    pub fn new(state: Arc<dyn StateAdapter>, user_name: impl Into<String>) -> Self {
        Self {
            adapters: HashMap::new(),
            state,
            user_name: user_name.into(),
            handlers: Vec::new(),
            initialized: tokio::sync::Mutex::new(false),
        }
    }

    pub fn add_adapter(&mut self, adapter: Arc<dyn ChatAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn adapter(&self, name: &str) -> Option<Arc<dyn ChatAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn state(&self) -> &Arc<dyn StateAdapter> {
        &self.state
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Connect the state adapter. Idempotent; simultaneous callers queue
    /// behind one in-flight initialization and observe its outcome.
    pub async fn initialize(&self) -> Result<(), crate::state::StateError> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }
        self.state.connect().await?;
        *initialized = true;
        Ok(())
    }

    /// Run `callback` when the bot is mentioned in a thread it is not yet
    /// subscribed to.
    pub fn on_new_mention<F, Fut>(&mut self, callback: F)
    where
        F: Fn(Thread, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers
            .push(Handler::Mention(Arc::new(move |t, m| {
                Box::pin(callback(t, m))
            })));
    }

    /// Run `callback` for every non-bot message in a subscribed thread.
    pub fn on_subscribed_message<F, Fut>(&mut self, callback: F)
    where
        F: Fn(Thread, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers
            .push(Handler::Subscribed(Arc::new(move |t, m| {
                Box::pin(callback(t, m))
            })));
    }

    /// Run `callback` whenever `pattern` matches a message's text,
    /// regardless of subscription state. A message in a subscribed thread
    /// that also matches a pattern is delivered to both handler kinds.
    pub fn on_new_message<F, Fut>(&mut self, pattern: &str, callback: F) -> Result<(), String>
    where
        F: Fn(Thread, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let regex =
            Regex::new(pattern).map_err(|e| format!("invalid message pattern '{pattern}': {e}"))?;
        self.handlers.push(Handler::Pattern(
            regex,
            Arc::new(move |t, m| Box::pin(callback(t, m))),
        ));
        Ok(())
    }

    /// Run `callback` for reaction changes whose normalized emoji is in
    /// `emojis`.
    pub fn on_reaction<I, S, F, Fut>(&mut self, emojis: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Thread, ReactionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let set: HashSet<String> = emojis
            .into_iter()
            .map(|e| emoji::normalize(&e.into()))
            .collect();
        self.handlers.push(Handler::Reaction(
            set,
            Arc::new(move |t, r| Box::pin(callback(t, r))),
        ));
    }

    fn is_self(&self, adapter: &dyn ChatAdapter, author: &Author) -> bool {
        if let Some(bot_id) = adapter.bot_user_id() {
            if bot_id == author.user_id {
                return true;
            }
        }
        author.user_name.eq_ignore_ascii_case(&self.user_name)
    }

    /// Deliver one normalized event to every matching handler.
    ///
    /// Completes when all matched handlers have run (or the event was
    /// dropped); spawn per event for cross-thread concurrency.
    pub async fn dispatch(&self, event: ChatEvent) {
        let adapter_name = event.adapter().to_string();
        let Some(adapter) = self.adapters.get(&adapter_name).cloned() else {
            log::warn!("dropping event for unknown adapter '{adapter_name}'");
            return;
        };

        // The bot's own activity never triggers handlers.
        let self_authored = match &event {
            ChatEvent::Mention(m) | ChatEvent::Message(m) => self.is_self(&*adapter, &m.author),
            ChatEvent::Reaction(r) => adapter
                .bot_user_id()
                .is_some_and(|id| id == r.user_id),
        };
        if self_authored {
            log::debug!("dropping self-authored event in {}", event.thread_id());
            return;
        }

        let thread_id = event.thread_id().clone();
        let subscribed = match self.state.is_subscribed(&thread_id).await {
            Ok(subscribed) => subscribed,
            Err(e) => {
                log::error!("subscription lookup failed for {thread_id}: {e}");
                false
            }
        };

        // Matching order is fixed: mention, subscribed, pattern, reaction.
        let mut deliveries: Vec<(&'static str, HandlerFuture)> = Vec::new();
        let make_thread =
            || Thread::new(thread_id.clone(), Arc::clone(&adapter), Arc::clone(&self.state));

        let is_mention = matches!(&event, ChatEvent::Mention(_));
        if let ChatEvent::Mention(message) | ChatEvent::Message(message) = &event {
            for handler in &self.handlers {
                match handler {
                    Handler::Mention(cb) if is_mention && !subscribed => {
                        deliveries.push((handler.label(), cb(make_thread(), message.clone())));
                    }
                    Handler::Subscribed(cb) if subscribed && !message.author.bot => {
                        deliveries.push((handler.label(), cb(make_thread(), message.clone())));
                    }
                    Handler::Pattern(regex, cb) if regex.is_match(&message.text) => {
                        deliveries.push((handler.label(), cb(make_thread(), message.clone())));
                    }
                    _ => {}
                }
            }
        } else if let ChatEvent::Reaction(reaction) = &event {
            for handler in &self.handlers {
                if let Handler::Reaction(set, cb) = handler {
                    if set.contains(&reaction.emoji) {
                        deliveries.push((handler.label(), cb(make_thread(), reaction.clone())));
                    }
                }
            }
        }

        if deliveries.is_empty() {
            return;
        }

        // Serialize handler runs per thread through the state lock. A
        // contended lock means another worker already owns this event.
        let lock = match self.state.acquire_lock(&thread_id, LOCK_TTL).await {
            Ok(Some(lock)) => Some(lock),
            Ok(None) => {
                log::debug!("lock contended for {thread_id}, dropping event locally");
                return;
            }
            Err(e) => {
                log::warn!("lock acquisition failed for {thread_id}: {e}; running unserialized");
                None
            }
        };

        let work = async {
            for (label, future) in deliveries {
                if let Err(e) = future.await {
                    match e.downcast_ref::<AdapterError>() {
                        Some(ae) => log::error!(
                            "{label} handler failed in {thread_id}: adapter={} code={}: {ae}",
                            ae.adapter,
                            ae.code()
                        ),
                        None => log::error!("{label} handler failed in {thread_id}: {e}"),
                    }
                }
            }
        };
        tokio::pin!(work);

        if let Some(lock) = lock {
            loop {
                tokio::select! {
                    () = &mut work => break,
                    () = tokio::time::sleep(LOCK_TTL / 2) => {
                        match self.state.extend_lock(&lock, LOCK_TTL).await {
                            Ok(true) => {}
                            Ok(false) => {
                                log::warn!("lost the lock for {thread_id} mid-run");
                            }
                            Err(e) => log::warn!("lock extension failed for {thread_id}: {e}"),
                        }
                    }
                }
            }
            if let Err(e) = self.state.release_lock(&lock).await {
                log::warn!("lock release failed for {thread_id}: {e}");
            }
        } else {
            work.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::state::memory::MemoryStateAdapter;
    use crate::state::{Lock, StateError, SubscriptionStream};
    use crate::thread_id::ThreadId;
    use crate::types::Outgoing;

    struct MockAdapter {
        bot_user_id: Option<String>,
        posted: Mutex<Vec<(String, String)>>,
    }

    impl MockAdapter {
        fn new() -> Self {
            Self {
                bot_user_id: Some("BOT1".into()),
                posted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatAdapter for MockAdapter {
        fn name(&self) -> &str {
            "mock"
        }

        fn bot_user_id(&self) -> Option<String> {
            self.bot_user_id.clone()
        }

        fn decode_thread_id(&self, raw: &str) -> Result<ThreadId, AdapterError> {
            let id = ThreadId::parse(raw).map_err(|e| AdapterError::validation("mock", e))?;
            if id.adapter() != "mock" {
                return Err(AdapterError::validation(
                    "mock",
                    format!("thread id '{raw}' does not belong to mock"),
                ));
            }
            Ok(id)
        }

        fn parse_message(&self, _raw: &serde_json::Value) -> Result<Message, AdapterError> {
            Err(AdapterError::validation("mock", "not a wire adapter"))
        }

        async fn post_message(
            &self,
            thread: &ThreadId,
            content: &Outgoing,
        ) -> Result<String, AdapterError> {
            self.posted
                .lock()
                .unwrap()
                .push((thread.to_string(), content.text.clone()));
            Ok("posted-1".into())
        }

        async fn edit_message(
            &self,
            _thread: &ThreadId,
            _message_id: &str,
            _content: &Outgoing,
        ) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn delete_message(
            &self,
            _thread: &ThreadId,
            _message_id: &str,
        ) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn start_typing(&self, _thread: &ThreadId) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn add_reaction(
            &self,
            _thread: &ThreadId,
            _message_id: &str,
            _emoji: &str,
        ) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn remove_reaction(
            &self,
            _thread: &ThreadId,
            _message_id: &str,
            _emoji: &str,
        ) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    fn message(thread: &str, author_id: &str, author_name: &str, text: &str) -> Message {
        Message {
            id: "m1".into(),
            thread_id: ThreadId::parse(thread).unwrap(),
            author: Author {
                user_id: author_id.into(),
                user_name: author_name.into(),
                display_name: None,
                bot: false,
            },
            text: text.into(),
            formatted: None,
            attachments: Vec::new(),
            timestamp: Utc::now(),
            edited: false,
        }
    }

    async fn bot_with_memory_state() -> (Bot, Arc<MemoryStateAdapter>) {
        let state = Arc::new(MemoryStateAdapter::new());
        let mut bot = Bot::new(state.clone(), "palaver");
        bot.add_adapter(Arc::new(MockAdapter::new()));
        bot.initialize().await.unwrap();
        (bot, state)
    }

    #[tokio::test]
    async fn self_authored_events_are_dropped() {
        let (mut bot, _state) = {
            let state = Arc::new(MemoryStateAdapter::new());
            let mut bot = Bot::new(state.clone(), "palaver");
            bot.add_adapter(Arc::new(MockAdapter::new()));
            bot.initialize().await.unwrap();
            (bot, state)
        };

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bot.on_new_message(".*", move |_t, _m| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        // Matches the adapter-reported bot user id.
        bot.dispatch(ChatEvent::Message(message("mock:1", "BOT1", "other-name", "hi")))
            .await;
        // Matches the configured user name (case-insensitive).
        bot.dispatch(ChatEvent::Message(message("mock:1", "U9", "Palaver", "hi")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "hi")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mention_fires_only_on_unsubscribed_threads() {
        let (mut bot, state) = bot_with_memory_state().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bot.on_new_mention(move |_t, _m| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let thread = ThreadId::parse("mock:1").unwrap();
        bot.dispatch(ChatEvent::Mention(message("mock:1", "U1", "ada", "@palaver hi")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        state.subscribe(&thread).await.unwrap();
        bot.dispatch(ChatEvent::Mention(message("mock:1", "U1", "ada", "@palaver again")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "subscribed thread must not re-fire");
    }

    #[tokio::test]
    async fn subscribed_messages_reach_subscribed_handlers_only() {
        let (mut bot, state) = bot_with_memory_state().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bot.on_subscribed_message(move |_t, _m| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "hello")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        state
            .subscribe(&ThreadId::parse("mock:1").unwrap())
            .await
            .unwrap();
        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "hello")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Messages from other bots never reach subscribed handlers.
        let mut from_bot = message("mock:1", "B2", "otherbot", "beep");
        from_bot.author.bot = true;
        bot.dispatch(ChatEvent::Message(from_bot)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pattern_and_subscribed_both_fire_on_subscribed_threads() {
        let (mut bot, state) = bot_with_memory_state().await;
        state
            .subscribe(&ThreadId::parse("mock:1").unwrap())
            .await
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let log = order.clone();
        bot.on_subscribed_message(move |_t, _m| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("subscribed");
                Ok(())
            }
        });
        let log = order.clone();
        bot.on_new_message("deploy", move |_t, _m| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("pattern");
                Ok(())
            }
        })
        .unwrap();

        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "deploy it")))
            .await;

        // Intentional double delivery, in fixed order.
        assert_eq!(*order.lock().unwrap(), vec!["subscribed", "pattern"]);
    }

    #[tokio::test]
    async fn pattern_handlers_ignore_non_matching_text() {
        let (mut bot, _state) = bot_with_memory_state().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bot.on_new_message(r"^!status\b", move |_t, _m| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "!status now")))
            .await;
        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "status?")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reaction_handlers_filter_by_emoji_set() {
        let (mut bot, _state) = bot_with_memory_state().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        bot.on_reaction(["thumbs_up", "fire"], move |_t, r| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(r.emoji);
                Ok(())
            }
        });

        let reaction = |emoji: &str, raw: &str| {
            ChatEvent::Reaction(ReactionEvent {
                adapter: "mock".into(),
                thread_id: ThreadId::parse("mock:1").unwrap(),
                message_id: "m7".into(),
                user_id: "U1".into(),
                emoji: emoji.into(),
                raw_emoji: raw.into(),
                added: true,
            })
        };

        bot.dispatch(reaction("thumbs_up", "+1")).await;
        bot.dispatch(reaction("eyes", "eyes")).await;
        bot.dispatch(reaction("fire", "🔥")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["thumbs_up", "fire"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_later_events() {
        let (mut bot, _state) = bot_with_memory_state().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bot.on_new_message(".*", move |_t, m| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if m.text.contains("explode") {
                    return Err("handler blew up".into());
                }
                Ok(())
            }
        })
        .unwrap();

        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "explode")))
            .await;
        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "still alive?")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn contended_thread_lock_drops_the_event() {
        let (mut bot, state) = bot_with_memory_state().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bot.on_new_message(".*", move |_t, _m| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        let thread = ThreadId::parse("mock:1").unwrap();
        let held = state
            .acquire_lock(&thread, Duration::from_secs(30))
            .await
            .unwrap()
            .expect("external lock");

        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "hi")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "locked thread must drop the event");

        state.release_lock(&held).await.unwrap();
        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "hi")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lock_is_released_after_dispatch() {
        let (mut bot, state) = bot_with_memory_state().await;
        bot.on_new_message(".*", |_t, _m| async { Ok(()) }).unwrap();

        bot.dispatch(ChatEvent::Message(message("mock:1", "U1", "ada", "hi")))
            .await;

        let thread = ThreadId::parse("mock:1").unwrap();
        assert!(
            state
                .acquire_lock(&thread, Duration::from_secs(1))
                .await
                .unwrap()
                .is_some(),
            "dispatch must release the thread lock on exit"
        );
    }

    #[tokio::test]
    async fn handlers_can_drive_the_thread_facade() {
        let state = Arc::new(MemoryStateAdapter::new());
        let adapter = Arc::new(MockAdapter::new());
        let mut bot = Bot::new(state.clone(), "palaver");
        bot.add_adapter(adapter.clone());
        bot.initialize().await.unwrap();

        bot.on_new_mention(|thread, _m| async move {
            thread.subscribe().await?;
            thread.post("subscribed!").await?;
            Ok(())
        });

        bot.dispatch(ChatEvent::Mention(message("mock:1", "U1", "ada", "@palaver hi")))
            .await;

        assert!(
            state
                .is_subscribed(&ThreadId::parse("mock:1").unwrap())
                .await
                .unwrap()
        );
        let posted = adapter.posted.lock().unwrap();
        assert_eq!(posted.as_slice(), &[("mock:1".to_string(), "subscribed!".to_string())]);
    }

    struct CountingState {
        inner: MemoryStateAdapter,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl StateAdapter for CountingState {
        async fn connect(&self) -> Result<(), StateError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.inner.connect().await
        }
        async fn disconnect(&self) -> Result<(), StateError> {
            self.inner.disconnect().await
        }
        async fn subscribe(&self, t: &ThreadId) -> Result<(), StateError> {
            self.inner.subscribe(t).await
        }
        async fn unsubscribe(&self, t: &ThreadId) -> Result<(), StateError> {
            self.inner.unsubscribe(t).await
        }
        async fn is_subscribed(&self, t: &ThreadId) -> Result<bool, StateError> {
            self.inner.is_subscribed(t).await
        }
        async fn list_subscriptions(
            &self,
            adapter: Option<&str>,
        ) -> Result<SubscriptionStream, StateError> {
            self.inner.list_subscriptions(adapter).await
        }
        async fn acquire_lock(
            &self,
            t: &ThreadId,
            ttl: Duration,
        ) -> Result<Option<Lock>, StateError> {
            self.inner.acquire_lock(t, ttl).await
        }
        async fn release_lock(&self, lock: &Lock) -> Result<(), StateError> {
            self.inner.release_lock(lock).await
        }
        async fn extend_lock(&self, lock: &Lock, ttl: Duration) -> Result<bool, StateError> {
            self.inner.extend_lock(lock, ttl).await
        }
        async fn cache_get(&self, key: &str) -> Result<Option<serde_json::Value>, StateError> {
            self.inner.cache_get(key).await
        }
        async fn cache_set(
            &self,
            key: &str,
            value: serde_json::Value,
            ttl: Option<Duration>,
        ) -> Result<(), StateError> {
            self.inner.cache_set(key, value, ttl).await
        }
        async fn cache_delete(&self, key: &str) -> Result<(), StateError> {
            self.inner.cache_delete(key).await
        }
    }

    #[tokio::test]
    async fn initialize_connects_exactly_once() {
        let state = Arc::new(CountingState {
            inner: MemoryStateAdapter::new(),
            connects: AtomicUsize::new(0),
        });
        let bot = Arc::new(Bot::new(state.clone(), "palaver"));

        let (a, b, c) = tokio::join!(bot.initialize(), bot.initialize(), bot.initialize());
        a.unwrap();
        b.unwrap();
        c.unwrap();
        bot.initialize().await.unwrap();

        assert_eq!(state.connects.load(Ordering::SeqCst), 1);
    }
}
