use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tokio::signal;

use palaver_core::bot::Bot;
use palaver_core::config::Config;
use palaver_core::state::StateAdapter;
use palaver_core::state::memory::MemoryStateAdapter;
use palaver_core::state::redis::RedisStateAdapter;
use palaver_core::types::ChatEvent;
use palaver_discord::{ControlChannel, DiscordAdapter, LocalControlChannel, RedisControlChannel};
use palaver_googlechat::GoogleChatAdapter;
use palaver_linear::LinearAdapter;
use palaver_slack::SlackAdapter;

#[derive(Parser)]
#[command(about = "palaver chatbot runtime server")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "palaver.toml")]
    config: PathBuf,
}

struct AppState {
    bot: Arc<Bot>,
    slack_signing_secret: Option<String>,
    discord_public_key: Option<String>,
    googlechat_verification_token: Option<String>,
    linear_signing_secret: Option<String>,
    cron_secret: Option<String>,
    max_gateway_duration_ms: u64,
    control: Arc<dyn ControlChannel>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let username = config.bot.resolved_username();

    // State backend: Redis when a URL is configured, in-memory otherwise.
    let redis_url = config.state.redis_url();
    let state_adapter: Arc<dyn StateAdapter> = match &redis_url {
        Some(url) => Arc::new(
            RedisStateAdapter::with_prefix(url, &config.state.key_prefix).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }),
        ),
        None => {
            if palaver_core::config::is_production() {
                log::warn!(
                    "running the in-memory state adapter in production; \
                     subscriptions and locks will not survive restarts or span instances"
                );
            }
            Arc::new(MemoryStateAdapter::new())
        }
    };

    let mut bot = Bot::new(state_adapter, username.clone());

    if config.interfaces.slack.enabled {
        let token = require_env(&config.interfaces.slack.bot_token_env);
        bot.add_adapter(Arc::new(SlackAdapter::new(
            token,
            config.interfaces.slack.bot_user_id.clone(),
        )));
    }

    if config.interfaces.discord.enabled {
        let token = require_env(&config.interfaces.discord.bot_token_env);
        let forward_url = config.gateway.forward_base_url().map(|base| {
            let mut url = format!("{base}/webhook/discord");
            if let Some(bypass) = config.gateway.bypass_secret() {
                url = format!("{url}?x-vercel-protection-bypass={bypass}");
            }
            url
        });
        if forward_url.is_none() {
            log::warn!("no forward url resolvable; gateway events will be dropped");
        }
        bot.add_adapter(Arc::new(
            DiscordAdapter::new(token.clone(), config.interfaces.discord.bot_user_id.clone())
                .with_gateway(token, forward_url),
        ));
    }

    if config.interfaces.googlechat.enabled {
        let token = require_env(&config.interfaces.googlechat.api_token_env);
        bot.add_adapter(Arc::new(GoogleChatAdapter::new(token, None)));
    }

    if config.interfaces.linear.enabled {
        let key = require_env(&config.interfaces.linear.api_key_env);
        bot.add_adapter(Arc::new(LinearAdapter::new(key, username.clone())));
    }

    register_default_handlers(&mut bot);

    let bot = Arc::new(bot);
    bot.initialize().await.unwrap_or_else(|e| {
        eprintln!("Error: failed to initialize the bot: {e}");
        std::process::exit(1);
    });

    let control: Arc<dyn ControlChannel> = match &redis_url {
        Some(url) => Arc::new(RedisControlChannel::new(url).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        })),
        None => Arc::new(LocalControlChannel::new()),
    };

    let state = Arc::new(AppState {
        bot,
        slack_signing_secret: optional_env(&config.interfaces.slack.signing_secret_env),
        discord_public_key: optional_env(&config.interfaces.discord.public_key_env),
        googlechat_verification_token: optional_env(
            &config.interfaces.googlechat.verification_token_env,
        ),
        linear_signing_secret: optional_env(&config.interfaces.linear.signing_secret_env),
        cron_secret: config.gateway.cron_secret(),
        max_gateway_duration_ms: config.gateway.max_duration_ms,
        control,
    });

    if state.slack_signing_secret.is_none() && config.interfaces.slack.enabled {
        log::warn!("slack signing secret is not set; webhook signatures are not verified");
    }

    let app = create_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to bind to {address}: {e}");
            std::process::exit(1);
        });

    println!("palaver-server listening on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: server error: {e}");
            std::process::exit(1);
        });
}

/// The runtime's built-in behavior: a mention subscribes the thread, a
/// stop command unsubscribes it.
fn register_default_handlers(bot: &mut Bot) {
    bot.on_new_mention(|thread, _message| async move {
        thread.subscribe().await?;
        thread
            .post("I'm listening to this thread now. Say 'stop' to unsubscribe.")
            .await?;
        Ok(())
    });

    bot.on_new_message(r"(?i)^\s*(stop|unsubscribe)\s*$", |thread, _message| async move {
        if thread.is_subscribed().await? {
            thread.unsubscribe().await?;
            thread.post("Unsubscribed from this thread.").await?;
        }
        Ok(())
    })
    .expect("built-in pattern is valid");
}

fn require_env(name: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            eprintln!("Error: environment variable '{name}' is not set");
            std::process::exit(1);
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/slack", post(slack_webhook))
        .route("/webhook/discord", post(discord_webhook))
        .route("/webhook/googlechat", post(googlechat_webhook))
        .route("/webhook/linear", post(linear_webhook))
        .route("/gateway/listen", get(gateway_listen))
        .with_state(state)
}

/// Dispatch events off the request path so the webhook can ack fast.
fn dispatch_all(state: &Arc<AppState>, events: Vec<ChatEvent>) {
    for event in events {
        let bot = Arc::clone(&state.bot);
        tokio::spawn(async move { bot.dispatch(event).await });
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn slack_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.slack_signing_secret {
        let timestamp = header(&headers, "x-slack-request-timestamp").unwrap_or("");
        let signature = header(&headers, "x-slack-signature").unwrap_or("");
        if let Err(e) = palaver_slack::ingress::verify_signature(secret, timestamp, signature, &body)
        {
            log::warn!("rejected slack webhook: {e}");
            return (StatusCode::UNAUTHORIZED, String::new()).into_response();
        }
    }

    match palaver_slack::ingress::parse_webhook(&body) {
        Ok(palaver_slack::ingress::SlackWebhook::UrlVerification { challenge }) => {
            (StatusCode::OK, challenge).into_response()
        }
        Ok(palaver_slack::ingress::SlackWebhook::Events(events)) => {
            dispatch_all(&state, events);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            log::warn!("undecodable slack webhook: {e}");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn discord_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(public_key) = &state.discord_public_key {
        let signature = header(&headers, "x-signature-ed25519").unwrap_or("");
        let timestamp = header(&headers, "x-signature-timestamp").unwrap_or("");
        if let Err(e) =
            palaver_discord::ingress::verify_signature(public_key, signature, timestamp, &body)
        {
            log::warn!("rejected discord webhook: {e}");
            return (StatusCode::UNAUTHORIZED, String::new()).into_response();
        }
    }

    let bot_user_id = state
        .bot
        .adapter(palaver_discord::ADAPTER_NAME)
        .and_then(|a| a.bot_user_id());
    match palaver_discord::ingress::parse_webhook(&body, bot_user_id.as_deref()) {
        Ok(palaver_discord::ingress::DiscordWebhook::Ping) => {
            Json(json!({ "type": 1 })).into_response()
        }
        Ok(palaver_discord::ingress::DiscordWebhook::Events(events)) => {
            dispatch_all(&state, events);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            log::warn!("undecodable discord webhook: {e}");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn googlechat_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    match palaver_googlechat::ingress::parse_webhook(
        &body,
        state.googlechat_verification_token.as_deref(),
    ) {
        Ok(events) => {
            dispatch_all(&state, events);
            Json(json!({})).into_response()
        }
        Err(e) if e.code() == "AUTH_FAILED" => {
            log::warn!("rejected google chat webhook: {e}");
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(e) => {
            log::warn!("undecodable google chat webhook: {e}");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn linear_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.linear_signing_secret {
        let signature = header(&headers, "linear-signature").unwrap_or("");
        if let Err(e) = palaver_linear::ingress::verify_signature(secret, signature, &body) {
            log::warn!("rejected linear webhook: {e}");
            return (StatusCode::UNAUTHORIZED, String::new()).into_response();
        }
    }

    match palaver_linear::ingress::parse_webhook(&body, state.bot.user_name()) {
        Ok(events) => {
            dispatch_all(&state, events);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            log::warn!("undecodable linear webhook: {e}");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

#[derive(Deserialize)]
struct GatewayQuery {
    /// Requested listen duration in milliseconds.
    #[serde(default)]
    duration: Option<u64>,
}

async fn gateway_listen(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // A listener endpoint without a configured secret is a deployment
    // error, not an auth failure.
    let Some(secret) = &state.cron_secret else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "configuration",
                "message": "CRON_SECRET is not configured"
            })),
        )
            .into_response();
    };

    let authorized = header(&headers, "authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == secret);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, String::new()).into_response();
    }

    let Some(adapter) = state.bot.adapter(palaver_discord::ADAPTER_NAME) else {
        return (StatusCode::NOT_FOUND, String::new()).into_response();
    };
    let Some(gateway) = adapter.gateway() else {
        return (StatusCode::NOT_FOUND, String::new()).into_response();
    };

    let requested = query.duration.unwrap_or(state.max_gateway_duration_ms);
    let duration = Duration::from_millis(requested.min(state.max_gateway_duration_ms));

    match palaver_discord::run_coordinated(&*state.control, gateway, duration).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            log::error!("gateway listener failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.code(), "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => log::info!("Received Ctrl+C, shutting down"),
        () = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}
