//! Runtime configuration.
//!
//! Parsed from a TOML file (`palaver.toml` by default). Secrets are never
//! stored in the file: each credential field names the environment
//! variable that holds the value (`*_env`), resolved at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::state::redis::DEFAULT_KEY_PREFIX;

const DEFAULT_USERNAME: &str = "palaver";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;

/// Gateway listener durations are capped at ten minutes.
pub const MAX_GATEWAY_DURATION_MS: u64 = 600_000;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub interfaces: InterfacesConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct BotConfig {
    /// Bot display name used for mention matching. Falls back to the
    /// `BOT_USERNAME` environment variable, then a built-in default.
    #[serde(default)]
    pub username: Option<String>,
}

impl BotConfig {
    pub fn resolved_username(&self) -> String {
        if let Some(ref name) = self.username {
            if !name.is_empty() {
                return name.clone();
            }
        }
        match std::env::var("BOT_USERNAME") {
            Ok(name) if !name.is_empty() => name,
            _ => DEFAULT_USERNAME.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct StateConfig {
    /// Environment variable holding the Redis URL. When unset or empty
    /// the in-memory backend is used.
    #[serde(default = "default_redis_url_env")]
    pub redis_url_env: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            redis_url_env: default_redis_url_env(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl StateConfig {
    pub fn redis_url(&self) -> Option<String> {
        match std::env::var(&self.redis_url_env) {
            Ok(url) if !url.is_empty() => Some(url),
            _ => None,
        }
    }
}

fn default_redis_url_env() -> String {
    "REDIS_URL".to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct InterfacesConfig {
    #[serde(default)]
    pub slack: SlackInterfaceConfig,
    #[serde(default)]
    pub discord: DiscordInterfaceConfig,
    #[serde(default)]
    pub googlechat: GoogleChatInterfaceConfig,
    #[serde(default)]
    pub linear: LinearInterfaceConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SlackInterfaceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_slack_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_slack_signing_env")]
    pub signing_secret_env: String,
    /// The bot's Slack user id (from `auth.test`), used to drop its own
    /// messages.
    #[serde(default)]
    pub bot_user_id: Option<String>,
}

impl Default for SlackInterfaceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token_env: default_slack_token_env(),
            signing_secret_env: default_slack_signing_env(),
            bot_user_id: None,
        }
    }
}

fn default_slack_token_env() -> String {
    "SLACK_BOT_TOKEN".to_string()
}

fn default_slack_signing_env() -> String {
    "SLACK_SIGNING_SECRET".to_string()
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DiscordInterfaceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_discord_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_discord_public_key_env")]
    pub public_key_env: String,
    #[serde(default)]
    pub bot_user_id: Option<String>,
}

impl Default for DiscordInterfaceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token_env: default_discord_token_env(),
            public_key_env: default_discord_public_key_env(),
            bot_user_id: None,
        }
    }
}

fn default_discord_token_env() -> String {
    "DISCORD_BOT_TOKEN".to_string()
}

fn default_discord_public_key_env() -> String {
    "DISCORD_PUBLIC_KEY".to_string()
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct GoogleChatInterfaceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_googlechat_token_env")]
    pub api_token_env: String,
    #[serde(default = "default_googlechat_verification_env")]
    pub verification_token_env: String,
}

impl Default for GoogleChatInterfaceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_token_env: default_googlechat_token_env(),
            verification_token_env: default_googlechat_verification_env(),
        }
    }
}

fn default_googlechat_token_env() -> String {
    "GOOGLE_CHAT_API_TOKEN".to_string()
}

fn default_googlechat_verification_env() -> String {
    "GOOGLE_CHAT_VERIFICATION_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct LinearInterfaceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_linear_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_linear_signing_env")]
    pub signing_secret_env: String,
}

impl Default for LinearInterfaceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: default_linear_api_key_env(),
            signing_secret_env: default_linear_signing_env(),
        }
    }
}

fn default_linear_api_key_env() -> String {
    "LINEAR_API_KEY".to_string()
}

fn default_linear_signing_env() -> String {
    "LINEAR_WEBHOOK_SECRET".to_string()
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct GatewayConfig {
    /// Environment variable holding the shared secret for the gateway
    /// listener endpoint.
    #[serde(default = "default_cron_secret_env")]
    pub cron_secret_env: String,
    /// Base URL gateway events are forwarded to. When unset, the hosted
    /// environment's URL variables are consulted (see
    /// [`GatewayConfig::forward_base_url`]).
    #[serde(default)]
    pub forward_url: Option<String>,
    #[serde(default = "default_bypass_secret_env")]
    pub bypass_secret_env: String,
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cron_secret_env: default_cron_secret_env(),
            forward_url: None,
            bypass_secret_env: default_bypass_secret_env(),
            max_duration_ms: default_max_duration_ms(),
        }
    }
}

impl GatewayConfig {
    pub fn cron_secret(&self) -> Option<String> {
        match std::env::var(&self.cron_secret_env) {
            Ok(secret) if !secret.is_empty() => Some(secret),
            _ => None,
        }
    }

    /// Resolve the public base URL to forward gateway events to: the
    /// configured override first, then the hosted environment's URL
    /// variables in order of specificity.
    pub fn forward_base_url(&self) -> Option<String> {
        if let Some(ref url) = self.forward_url {
            if !url.is_empty() {
                return Some(url.clone());
            }
        }
        for var in [
            "VERCEL_PROJECT_PRODUCTION_URL",
            "VERCEL_URL",
            "NEXT_PUBLIC_BASE_URL",
        ] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    if value.starts_with("http://") || value.starts_with("https://") {
                        return Some(value);
                    }
                    return Some(format!("https://{value}"));
                }
            }
        }
        None
    }

    pub fn bypass_secret(&self) -> Option<String> {
        match std::env::var(&self.bypass_secret_env) {
            Ok(secret) if !secret.is_empty() => Some(secret),
            _ => None,
        }
    }
}

fn default_cron_secret_env() -> String {
    "CRON_SECRET".to_string()
}

fn default_bypass_secret_env() -> String {
    "VERCEL_AUTOMATION_BYPASS_SECRET".to_string()
}

fn default_max_duration_ms() -> u64 {
    MAX_GATEWAY_DURATION_MS
}

/// True when the process runs with production settings.
pub fn is_production() -> bool {
    std::env::var("NODE_ENV").is_ok_and(|v| v == "production")
}

impl Config {
    /// Parse a config from TOML text.
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("invalid config: {e}"))
    }

    /// Load a config file, or defaults when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
        Self::parse(&text)
    }
}
