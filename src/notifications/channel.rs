//! Wire boundary of a notification channel.

use async_trait::async_trait;

use super::NotifierError;

/// Identifier a channel assigns to a posted message.
pub type MessageId = String;

/// Outbound messaging operations a channel exposes.
///
/// Implementations own their wire protocol and rate limits. They never retry;
/// a failed call surfaces as a [`NotifierError`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable channel kind stored with each thread (e.g. `telegram`).
    fn kind(&self) -> &str;

    async fn send_message(&self, text: &str) -> Result<MessageId, NotifierError>;

    async fn reply_to(&self, message_id: &str, text: &str) -> Result<MessageId, NotifierError>;

    async fn delete_message(&self, message_id: &str) -> Result<(), NotifierError>;
}
