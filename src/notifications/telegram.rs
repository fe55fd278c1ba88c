//! Telegram Bot API channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Channel, MessageId, NotifierError};
use crate::config::TelegramConfig;

const KIND: &str = "telegram";

#[derive(Debug, Deserialize)]
struct BotResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Posts Markdown messages to a chat or a public channel.
pub struct TelegramChannel {
    client: reqwest::Client,
    endpoint: String,
    chat: Value,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self, NotifierError> {
        let chat = match (config.chat_id, config.channel_name.as_deref()) {
            (Some(id), _) if id != 0 => json!(id),
            (_, Some(name)) if !name.is_empty() => {
                let name = if name.starts_with('@') {
                    name.to_string()
                } else {
                    format!("@{}", name)
                };
                json!(name)
            }
            _ => {
                return Err(NotifierError::Configuration {
                    details: "telegram needs a chat id or a channel name".to_string(),
                });
            }
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Configuration {
                details: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.token
            ),
            chat,
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: Value,
    ) -> Result<T, NotifierError> {
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, method))
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::Transport {
                channel: KIND.to_string(),
                // The endpoint embeds the bot token
                details: e.without_url().to_string(),
            })?;

        let status = response.status();
        let body: BotResponse<T> = response.json().await.map_err(|e| NotifierError::Response {
            channel: KIND.to_string(),
            details: e.without_url().to_string(),
        })?;

        if !status.is_success() || !body.ok {
            return Err(NotifierError::Http {
                channel: KIND.to_string(),
                status: status.as_u16(),
                body: body.description.unwrap_or_default(),
            });
        }

        body.result.ok_or_else(|| NotifierError::Response {
            channel: KIND.to_string(),
            details: format!("{} returned no result", method),
        })
    }

    async fn send(&self, text: &str, reply_to: Option<i64>) -> Result<MessageId, NotifierError> {
        let mut payload = json!({
            "chat_id": self.chat,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        if let Some(reply_to) = reply_to {
            payload["reply_to_message_id"] = json!(reply_to);
        }

        let sent: SentMessage = self.call("sendMessage", payload).await?;
        debug!(message_id = sent.message_id, "telegram message sent");
        Ok(sent.message_id.to_string())
    }

    fn parse_id(message_id: &str) -> Result<i64, NotifierError> {
        message_id.parse().map_err(|_| NotifierError::Response {
            channel: KIND.to_string(),
            details: format!("'{}' is not a telegram message id", message_id),
        })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn kind(&self) -> &str {
        KIND
    }

    async fn send_message(&self, text: &str) -> Result<MessageId, NotifierError> {
        self.send(text, None).await
    }

    async fn reply_to(&self, message_id: &str, text: &str) -> Result<MessageId, NotifierError> {
        let reply_to = Self::parse_id(message_id)?;
        self.send(text, Some(reply_to)).await
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), NotifierError> {
        let message_id = Self::parse_id(message_id)?;
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": self.chat, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }
}
