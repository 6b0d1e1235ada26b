// palaver-discord: Discord adapter for the palaver chatbot runtime.
//
// Inbound events arrive two ways: interaction webhooks signed with the
// application's Ed25519 key, and gateway dispatch frames forwarded over
// HTTP by the long-running gateway listener. The listener itself is
// coordinated across rolling invocations through a pub/sub control
// channel so exactly one socket is live at a time.

pub mod adapter;
pub mod client;
pub mod coordinator;
pub mod gateway;
pub mod ingress;

pub use adapter::{ADAPTER_NAME, DiscordAdapter};
pub use coordinator::{ControlChannel, LocalControlChannel, RedisControlChannel, run_coordinated};
pub use gateway::DiscordGateway;
