//! Notification thread repository
//!
//! Persists the open conversation per (channel, product URL). Only the
//! notification layer writes here.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::error::PersistenceError;
use crate::models::notification_thread::{self, Entity as NotificationThread};

#[derive(Debug, Clone)]
pub struct ThreadRepository {
    db: Arc<DatabaseConnection>,
}

impl ThreadRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_url(
        &self,
        channel: &str,
        product_url: &str,
    ) -> Result<Option<notification_thread::Model>, PersistenceError> {
        NotificationThread::find()
            .filter(notification_thread::Column::Channel.eq(channel))
            .filter(notification_thread::Column::ProductUrl.eq(product_url))
            .one(&*self.db)
            .await
            .map_err(PersistenceError::context(format!(
                "find {} thread for {}",
                channel, product_url
            )))
    }

    pub async fn find_by_hash(
        &self,
        channel: &str,
        content_hash: &str,
    ) -> Result<Option<notification_thread::Model>, PersistenceError> {
        NotificationThread::find()
            .filter(notification_thread::Column::Channel.eq(channel))
            .filter(notification_thread::Column::ContentHash.eq(content_hash))
            .order_by_desc(notification_thread::Column::UpdatedAt)
            .one(&*self.db)
            .await
            .map_err(PersistenceError::context(format!(
                "find {} thread with hash {}",
                channel, content_hash
            )))
    }

    /// Lists the threads of one channel, oldest first.
    pub async fn list_by_channel(
        &self,
        channel: &str,
    ) -> Result<Vec<notification_thread::Model>, PersistenceError> {
        NotificationThread::find()
            .filter(notification_thread::Column::Channel.eq(channel))
            .order_by_asc(notification_thread::Column::Id)
            .all(&*self.db)
            .await
            .map_err(PersistenceError::context(format!("list {} threads", channel)))
    }

    /// Records a freshly opened thread.
    pub async fn open(
        &self,
        channel: &str,
        product_url: &str,
        external_message_id: &str,
        content_hash: Option<String>,
    ) -> Result<notification_thread::Model, PersistenceError> {
        let now = Utc::now().into();
        notification_thread::ActiveModel {
            channel: Set(channel.to_string()),
            product_url: Set(product_url.to_string()),
            external_message_id: Set(external_message_id.to_string()),
            last_external_message_id: Set(None),
            content_hash: Set(content_hash),
            counter: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(PersistenceError::context(format!(
            "open {} thread for {}",
            channel, product_url
        )))
    }

    /// Points an existing row at a new opening message, resetting the counter.
    pub async fn reopen(
        &self,
        thread: notification_thread::Model,
        external_message_id: &str,
        content_hash: Option<String>,
    ) -> Result<notification_thread::Model, PersistenceError> {
        let operation = format!("reopen {} thread for {}", thread.channel, thread.product_url);
        let mut active: notification_thread::ActiveModel = thread.into();
        active.external_message_id = Set(external_message_id.to_string());
        active.last_external_message_id = Set(None);
        active.content_hash = Set(content_hash);
        active.counter = Set(1);
        active.updated_at = Set(Utc::now().into());
        active
            .update(&*self.db)
            .await
            .map_err(PersistenceError::context(operation))
    }

    /// Stores a repeat announcement: bumps the counter and the latest message.
    pub async fn record_repeat(
        &self,
        thread: notification_thread::Model,
        counter: i32,
        external_message_id: &str,
    ) -> Result<notification_thread::Model, PersistenceError> {
        let operation = format!("update {} thread for {}", thread.channel, thread.product_url);
        let mut active: notification_thread::ActiveModel = thread.into();
        active.counter = Set(counter);
        active.last_external_message_id = Set(Some(external_message_id.to_string()));
        active.updated_at = Set(Utc::now().into());
        active
            .update(&*self.db)
            .await
            .map_err(PersistenceError::context(operation))
    }

    pub async fn delete(&self, thread: notification_thread::Model) -> Result<(), PersistenceError> {
        let operation = format!("delete {} thread for {}", thread.channel, thread.product_url);
        thread
            .delete(&*self.db)
            .await
            .map(|_| ())
            .map_err(PersistenceError::context(operation))
    }

    /// Deletes threads idle for more than `retention_days`. Returns how many were removed.
    pub async fn purge_older_than(&self, retention_days: u32) -> Result<u64, PersistenceError> {
        let cutoff: DateTimeWithTimeZone =
            (Utc::now() - Duration::days(i64::from(retention_days))).into();
        NotificationThread::delete_many()
            .filter(notification_thread::Column::UpdatedAt.lt(cutoff))
            .exec(&*self.db)
            .await
            .map(|result| result.rows_affected)
            .map_err(PersistenceError::context("purge notification threads"))
    }
}
