//! Thin Linear GraphQL client for comment and reaction mutations.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use palaver_core::emoji;
use palaver_core::error::AdapterError;

use crate::adapter::ADAPTER_NAME;

const LINEAR_API_URL: &str = "https://api.linear.app/graphql";

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<serde_json::Value>,
}

pub struct LinearClient {
    http: Client,
    api_key: String,
    api_url: String,
}

impl LinearClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            api_url: LINEAR_API_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_api_url(api_key: String, api_url: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            api_url,
        }
    }

    async fn execute(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(AdapterError::rate_limited(ADAPTER_NAME, retry_after));
            }
            StatusCode::UNAUTHORIZED => {
                return Err(AdapterError::authentication(ADAPTER_NAME));
            }
            _ => {}
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::network(ADAPTER_NAME, e))?;

        if let Some(errors) = body.errors {
            if let Some(first) = errors.first() {
                return Err(map_graphql_error(first));
            }
        }
        body.data.ok_or_else(|| {
            AdapterError::validation(ADAPTER_NAME, "graphql response without data")
        })
    }

    pub async fn create_comment(&self, issue_id: &str, body: &str) -> Result<String, AdapterError> {
        let data = self
            .execute(
                "mutation CommentCreate($issueId: String!, $body: String!) {
                    commentCreate(input: { issueId: $issueId, body: $body }) {
                        success
                        comment { id }
                    }
                }",
                json!({ "issueId": issue_id, "body": body }),
            )
            .await?;
        data.pointer("/commentCreate/comment/id")
            .and_then(|id| id.as_str())
            .map(String::from)
            .ok_or_else(|| {
                AdapterError::validation(ADAPTER_NAME, "commentCreate returned no comment id")
            })
    }

    pub async fn update_comment(&self, comment_id: &str, body: &str) -> Result<(), AdapterError> {
        self.execute(
            "mutation CommentUpdate($id: String!, $body: String!) {
                commentUpdate(id: $id, input: { body: $body }) { success }
            }",
            json!({ "id": comment_id, "body": body }),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<(), AdapterError> {
        self.execute(
            "mutation CommentDelete($id: String!) {
                commentDelete(id: $id) { success }
            }",
            json!({ "id": comment_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn create_reaction(
        &self,
        comment_id: &str,
        emoji_key: &str,
    ) -> Result<(), AdapterError> {
        self.execute(
            "mutation ReactionCreate($commentId: String!, $emoji: String!) {
                reactionCreate(input: { commentId: $commentId, emoji: $emoji }) { success }
            }",
            json!({ "commentId": comment_id, "emoji": linear_emoji(emoji_key) }),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_reaction(
        &self,
        comment_id: &str,
        emoji_key: &str,
    ) -> Result<(), AdapterError> {
        // Linear keys reactions by (comment, emoji) for the
        // authenticated user.
        self.execute(
            "mutation ReactionDelete($commentId: String!, $emoji: String!) {
                reactionDelete(commentId: $commentId, emoji: $emoji) { success }
            }",
            json!({ "commentId": comment_id, "emoji": linear_emoji(emoji_key) }),
        )
        .await?;
        Ok(())
    }
}

/// Linear uses Slack-style short names (`thumbsup`, `heart`, …).
fn linear_emoji(emoji_key: &str) -> &str {
    match emoji_key {
        "thumbs_up" => "thumbsup",
        "thumbs_down" => "thumbsdown",
        other => emoji::to_slack_name(other),
    }
}

fn map_graphql_error(error: &GraphQlError) -> AdapterError {
    let code = error
        .extensions
        .as_ref()
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or("");
    match code {
        "RATELIMITED" => AdapterError::rate_limited(ADAPTER_NAME, None),
        "AUTHENTICATION_ERROR" => AdapterError::authentication(ADAPTER_NAME),
        "FORBIDDEN" => AdapterError::permission(ADAPTER_NAME, "run the mutation", None),
        _ if error.message.to_lowercase().contains("not found") => {
            AdapterError::not_found(ADAPTER_NAME, "entity", None)
        }
        _ => AdapterError::validation(
            ADAPTER_NAME,
            format!("linear rejected the mutation: {}", error.message),
        ),
    }
}
