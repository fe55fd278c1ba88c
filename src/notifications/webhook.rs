//! Generic JSON webhook channel.
//!
//! `POST {url}/messages` with `{"text", "reply_to"}` answers `{"id": "..."}`;
//! `DELETE {url}/messages/{id}` removes a message.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{Channel, MessageId, NotifierError};

const KIND: &str = "webhook";

#[derive(Debug, Deserialize)]
struct PostedMessage {
    id: serde_json::Value,
}

pub struct WebhookChannel {
    client: reqwest::Client,
    base_url: String,
}

impl WebhookChannel {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifierError> {
        let parsed = Url::parse(url).map_err(|e| NotifierError::Configuration {
            details: format!("invalid webhook url: {}", e),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifierError::Configuration {
                details: format!("unsupported webhook scheme '{}'", parsed.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Configuration {
                details: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    fn transport(err: reqwest::Error) -> NotifierError {
        NotifierError::Transport {
            channel: KIND.to_string(),
            details: err.without_url().to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, NotifierError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifierError::Http {
            channel: KIND.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn post(&self, text: &str, reply_to: Option<&str>) -> Result<MessageId, NotifierError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&json!({ "text": text, "reply_to": reply_to }))
            .send()
            .await
            .map_err(Self::transport)?;

        let posted: PostedMessage = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| NotifierError::Response {
                channel: KIND.to_string(),
                details: e.without_url().to_string(),
            })?;

        let id = match posted.id {
            serde_json::Value::String(id) if !id.is_empty() => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => {
                return Err(NotifierError::Response {
                    channel: KIND.to_string(),
                    details: format!("invalid message id {}", other),
                });
            }
        };
        debug!(message_id = %id, "webhook message posted");
        Ok(id)
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn kind(&self) -> &str {
        KIND
    }

    async fn send_message(&self, text: &str) -> Result<MessageId, NotifierError> {
        self.post(text, None).await
    }

    async fn reply_to(&self, message_id: &str, text: &str) -> Result<MessageId, NotifierError> {
        self.post(text, Some(message_id)).await
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), NotifierError> {
        let response = self
            .client
            .delete(format!("{}/messages/{}", self.base_url, message_id))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await.map(|_| ())
    }
}
