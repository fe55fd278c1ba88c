//! Notification thread entity model
//!
//! A thread is the open conversation about one product's availability on one
//! notification channel. `content_hash` and `counter` are only meaningful for
//! channels that deduplicate by message content.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "notification_threads")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Channel kind the thread lives on (e.g. `telegram`, `webhook`)
    pub channel: String,

    /// URL of the product the thread announces
    pub product_url: String,

    /// Identifier of the message that opened the thread
    pub external_message_id: String,

    /// Identifier of the most recent message posted in the thread
    pub last_external_message_id: Option<String>,

    /// Hash of the rendered opening message
    pub content_hash: Option<String>,

    /// Number of times the same content has been announced
    pub counter: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Message a close reply should answer: the latest one, or the opener.
    pub fn reply_target(&self) -> &str {
        self.last_external_message_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.external_message_id)
    }
}
