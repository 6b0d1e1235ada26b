// palaver-googlechat: Google Chat adapter for the palaver chatbot runtime.
//
// Ingress is the Chat app webhook, authenticated with the app's
// verification token. Service-account bots cannot add reactions; the
// reaction operations refuse with a typed Permission error so callers can
// branch on it.

pub mod adapter;
pub mod client;
pub mod ingress;

pub use adapter::{ADAPTER_NAME, GoogleChatAdapter, GoogleChatThread};
