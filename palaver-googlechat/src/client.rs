//! Thin Google Chat REST client.

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use palaver_core::error::AdapterError;

use crate::adapter::ADAPTER_NAME;

const CHAT_API_BASE: &str = "https://chat.googleapis.com/v1";

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    name: String,
}

pub struct GoogleChatClient {
    http: Client,
    api_token: String,
    base_url: String,
}

impl GoogleChatClient {
    pub fn new(api_token: String) -> Self {
        Self {
            http: Client::new(),
            api_token,
            base_url: CHAT_API_BASE.to_string(),
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
        action: &str,
    ) -> Result<reqwest::Response, AdapterError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method, &url)
            .query(query)
            .bearer_auth(&self.api_token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => Err(AdapterError::rate_limited(ADAPTER_NAME, None)),
            StatusCode::UNAUTHORIZED => Err(AdapterError::authentication(ADAPTER_NAME)),
            StatusCode::FORBIDDEN => Err(AdapterError::permission(ADAPTER_NAME, action, None)),
            StatusCode::NOT_FOUND => Err(AdapterError::not_found(
                ADAPTER_NAME,
                "message",
                Some(path.to_string()),
            )),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AdapterError::new(
                    ADAPTER_NAME,
                    palaver_core::error::AdapterErrorKind::Network,
                )
                .with_message(format!("chat api returned {status}: {body}")))
            }
        }
    }

    /// Create a message in a thread; returns the message id.
    pub async fn create_message(
        &self,
        space: &str,
        thread: &str,
        text: &str,
    ) -> Result<String, AdapterError> {
        let body = json!({
            "text": text,
            "thread": { "name": format!("spaces/{space}/threads/{thread}") }
        });
        let response = self
            .request(
                Method::POST,
                &format!("/spaces/{space}/messages"),
                &[("messageReplyOption", "REPLY_MESSAGE_FALLBACK_TO_NEW_THREAD")],
                Some(body),
                "post a message",
            )
            .await?;
        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;
        // `name` is `spaces/AAA/messages/MMM`; the id is the last segment.
        Ok(created
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&created.name)
            .to_string())
    }

    pub async fn update_message(
        &self,
        space: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), AdapterError> {
        self.request(
            Method::PATCH,
            &format!("/spaces/{space}/messages/{message_id}"),
            &[("updateMask", "text")],
            Some(json!({ "text": text })),
            "edit a message",
        )
        .await?;
        Ok(())
    }

    pub async fn delete_message(&self, space: &str, message_id: &str) -> Result<(), AdapterError> {
        self.request(
            Method::DELETE,
            &format!("/spaces/{space}/messages/{message_id}"),
            &[],
            None,
            "delete a message",
        )
        .await?;
        Ok(())
    }
}
