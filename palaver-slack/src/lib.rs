// palaver-slack: Slack adapter for the palaver chatbot runtime.
//
// Ingress is the Events API over webhooks: requests are authenticated with
// Slack's v0 HMAC signature, then normalized into core events. Outbound
// operations go through the Web API.

pub mod adapter;
pub mod client;
pub mod ingress;

pub use adapter::{ADAPTER_NAME, SlackAdapter, SlackThread};
