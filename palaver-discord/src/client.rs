//! Thin Discord REST client.

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use palaver_core::emoji;
use palaver_core::error::AdapterError;

use crate::adapter::ADAPTER_NAME;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct PostedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: Option<f64>,
}

pub struct DiscordClient {
    http: Client,
    token: String,
    base_url: String,
}

impl DiscordClient {
    pub fn new(token: String) -> Self {
        Self {
            http: Client::new(),
            token,
            base_url: DISCORD_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            http: Client::new(),
            token,
            base_url,
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        action: &str,
    ) -> Result<reqwest::Response, AdapterError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        self.check_status(response, path, action).await
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        path: &str,
        action: &str,
    ) -> Result<reqwest::Response, AdapterError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|b| b.retry_after)
                    .map(|secs| secs.ceil() as u64);
                Err(AdapterError::rate_limited(ADAPTER_NAME, retry_after))
            }
            StatusCode::UNAUTHORIZED => Err(AdapterError::authentication(ADAPTER_NAME)),
            StatusCode::FORBIDDEN => {
                Err(AdapterError::permission(ADAPTER_NAME, action, None))
            }
            StatusCode::NOT_FOUND => Err(AdapterError::not_found(
                ADAPTER_NAME,
                "resource",
                Some(path.to_string()),
            )),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AdapterError::new(
                    ADAPTER_NAME,
                    palaver_core::error::AdapterErrorKind::Network,
                )
                .with_message(format!("discord api returned {status}: {body}")))
            }
        }
    }

    pub async fn create_message(&self, channel: &str, content: &str) -> Result<String, AdapterError> {
        let response = self
            .request(
                Method::POST,
                &format!("/channels/{channel}/messages"),
                Some(json!({ "content": content })),
                "post a message",
            )
            .await?;
        let posted: PostedMessage = response
            .json()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        Ok(posted.id)
    }

    pub async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), AdapterError> {
        self.request(
            Method::PATCH,
            &format!("/channels/{channel}/messages/{message_id}"),
            Some(json!({ "content": content })),
            "edit a message",
        )
        .await?;
        Ok(())
    }

    pub async fn delete_message(
        &self,
        channel: &str,
        message_id: &str,
    ) -> Result<(), AdapterError> {
        self.request(
            Method::DELETE,
            &format!("/channels/{channel}/messages/{message_id}"),
            None,
            "delete a message",
        )
        .await?;
        Ok(())
    }

    pub async fn trigger_typing(&self, channel: &str) -> Result<(), AdapterError> {
        self.request(
            Method::POST,
            &format!("/channels/{channel}/typing"),
            None,
            "trigger typing",
        )
        .await?;
        Ok(())
    }

    pub async fn add_reaction(
        &self,
        channel: &str,
        message_id: &str,
        emoji_key: &str,
    ) -> Result<(), AdapterError> {
        let path = format!(
            "/channels/{channel}/messages/{message_id}/reactions/{}/@me",
            encode_emoji(emoji_key)
        );
        self.request(Method::PUT, &path, None, "add a reaction").await?;
        Ok(())
    }

    pub async fn remove_reaction(
        &self,
        channel: &str,
        message_id: &str,
        emoji_key: &str,
    ) -> Result<(), AdapterError> {
        let path = format!(
            "/channels/{channel}/messages/{message_id}/reactions/{}/@me",
            encode_emoji(emoji_key)
        );
        self.request(Method::DELETE, &path, None, "remove a reaction")
            .await?;
        Ok(())
    }
}

/// Reaction endpoints take the percent-encoded unicode emoji (or a
/// `name:id` pair for custom emoji, passed through as-is).
fn encode_emoji(emoji_key: &str) -> String {
    let raw = emoji::to_unicode(emoji_key).unwrap_or(emoji_key);
    urlencoding::encode(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_emoji_keys_encode_to_unicode() {
        assert_eq!(encode_emoji("thumbs_up"), urlencoding::encode("👍"));
        // Custom emoji pass through with the name:id shape intact.
        assert_eq!(encode_emoji("party_blob:123456"), "party_blob%3A123456");
    }

    #[tokio::test]
    async fn create_message_posts_with_bot_token() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut total = 0;
            loop {
                stream.readable().await.unwrap();
                match stream.try_read(&mut buf[total..]) {
                    Ok(0) => break,
                    Ok(n) => {
                        total += n;
                        let request = String::from_utf8_lossy(&buf[..total]);
                        if let Some(header_end) = request.find("\r\n\r\n") {
                            let content_length = request
                                .lines()
                                .find(|l| l.to_lowercase().starts_with("content-length:"))
                                .and_then(|l| l.split(':').nth(1))
                                .and_then(|v| v.trim().parse::<usize>().ok())
                                .unwrap_or(0);
                            if total - (header_end + 4) >= content_length {
                                break;
                            }
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                    Err(_) => break,
                }
            }

            let request = String::from_utf8_lossy(&buf[..total]).to_string();
            let body = r#"{"id":"111222333"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.writable().await.unwrap();
            stream.try_write(response.as_bytes()).unwrap();
            request
        });

        let client = DiscordClient::with_base_url("bot-token".into(), format!("http://{addr}"));
        let id = client.create_message("C42", "hello discord").await.unwrap();
        assert_eq!(id, "111222333");

        let captured = server.await.unwrap();
        assert!(captured.contains("POST /channels/C42/messages"));
        assert!(captured.contains("Authorization: Bot bot-token"));
        assert!(captured.contains("hello discord"));
    }

    #[tokio::test]
    async fn rate_limit_surfaces_retry_after() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            stream.readable().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = stream.try_read(&mut buf);
            let body = r#"{"message":"You are being rate limited.","retry_after":2.5}"#;
            let response = format!(
                "HTTP/1.1 429 Too Many Requests\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.writable().await.unwrap();
            stream.try_write(response.as_bytes()).unwrap();
        });

        let client = DiscordClient::with_base_url("t".into(), format!("http://{addr}"));
        let err = client.create_message("C1", "hi").await.unwrap_err();
        assert_eq!(err.code(), "RATE_LIMITED");
        match err.kind {
            palaver_core::error::AdapterErrorKind::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(3));
            }
            _ => panic!("wrong kind"),
        }
    }
}
