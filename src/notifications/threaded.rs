//! Thread lifecycle on top of a [`Channel`].
//!
//! An announcement opens (or repeats) a thread; a sold-out notification
//! optionally replies to it and then always removes the thread record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::formatter::{self, Announcement, Hashtags};
use super::{Channel, DedupStrategy, Notifier, NotifierError};
use crate::error::PersistenceError;
use crate::models::notification_thread;
use crate::repositories::ThreadRepository;

/// How announcements are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    /// Single line with hashtags, product name truncated to fit.
    Compact { max_length: usize },
    /// Telegram Markdown card.
    Telegram,
}

/// Per-channel behaviour.
#[derive(Debug, Clone)]
pub struct ChannelPolicy {
    pub dedup: DedupStrategy,
    pub enable_replies: bool,
    pub style: MessageStyle,
    pub hashtags: Hashtags,
}

pub struct ThreadedNotifier {
    channel: Arc<dyn Channel>,
    policy: ChannelPolicy,
    threads: ThreadRepository,
}

impl ThreadedNotifier {
    pub fn new(channel: Arc<dyn Channel>, policy: ChannelPolicy, threads: ThreadRepository) -> Self {
        Self {
            channel,
            policy,
            threads,
        }
    }

    fn kind(&self) -> &str {
        self.channel.kind()
    }

    fn thread_error(&self, source: PersistenceError) -> NotifierError {
        NotifierError::Thread {
            channel: self.kind().to_string(),
            source,
        }
    }

    fn render(&self, announcement: &Announcement<'_>, counter: i32) -> String {
        match self.policy.style {
            MessageStyle::Compact { max_length } => formatter::render_compact(
                announcement,
                self.policy.hashtags.for_product(announcement.product_name),
                counter,
                max_length,
            ),
            MessageStyle::Telegram => formatter::render_telegram(announcement, Utc::now()),
        }
    }

    /// Removes a message whose thread could not be stored. Best effort.
    async fn retract(&self, message_id: &str) {
        if let Err(err) = self.channel.delete_message(message_id).await {
            warn!(
                channel = self.kind(),
                message_id,
                error = %err,
                "could not retract message without thread"
            );
        }
    }

    async fn store_opened(
        &self,
        url: &str,
        message_id: &str,
        content_hash: Option<String>,
    ) -> Result<notification_thread::Model, PersistenceError> {
        match self.threads.find_by_url(self.kind(), url).await? {
            // A thread left open, e.g. its close ran with notifications disabled
            Some(stale) => self.threads.reopen(stale, message_id, content_hash).await,
            None => {
                self.threads
                    .open(self.kind(), url, message_id, content_hash)
                    .await
            }
        }
    }

    async fn open_thread(
        &self,
        announcement: &Announcement<'_>,
        message: &str,
        content_hash: Option<String>,
    ) -> Result<(), NotifierError> {
        let message_id = self.channel.send_message(message).await?;
        debug!(channel = self.kind(), %message_id, url = announcement.url, "thread opened");

        if let Err(err) = self
            .store_opened(announcement.url, &message_id, content_hash)
            .await
        {
            self.retract(&message_id).await;
            return Err(self.thread_error(err));
        }
        Ok(())
    }

    async fn repeat_thread(
        &self,
        thread: notification_thread::Model,
        announcement: &Announcement<'_>,
    ) -> Result<(), NotifierError> {
        let counter = thread.counter + 1;
        let message = self.render(announcement, counter);
        let message_id = self.channel.send_message(&message).await?;
        debug!(channel = self.kind(), %message_id, counter, url = announcement.url, "thread repeated");

        if let Err(err) = self.threads.record_repeat(thread, counter, &message_id).await {
            self.retract(&message_id).await;
            return Err(self.thread_error(err));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for ThreadedNotifier {
    fn name(&self) -> &str {
        self.kind()
    }

    async fn notify_available(&self, announcement: &Announcement<'_>) -> Result<(), NotifierError> {
        let message = self.render(announcement, 0);

        match self.policy.dedup {
            DedupStrategy::ProductUrl => self.open_thread(announcement, &message, None).await,
            DedupStrategy::ContentHash => {
                let hash = formatter::content_hash(&message);
                let existing = self
                    .threads
                    .find_by_hash(self.kind(), &hash)
                    .await
                    .map_err(|e| self.thread_error(e))?;
                match existing {
                    Some(thread) => self.repeat_thread(thread, announcement).await,
                    None => self.open_thread(announcement, &message, Some(hash)).await,
                }
            }
        }
    }

    async fn notify_unavailable(&self, url: &str, elapsed: Duration) -> Result<(), NotifierError> {
        let thread = self
            .threads
            .find_by_url(self.kind(), url)
            .await
            .map_err(|e| self.thread_error(e))?;

        let Some(thread) = thread else {
            debug!(channel = self.kind(), url, "no open thread, nothing to close");
            return Ok(());
        };

        let replied = if self.policy.enable_replies {
            self.channel
                .reply_to(thread.reply_target(), &formatter::render_gone(elapsed))
                .await
                .map(|reply_id| {
                    debug!(channel = self.kind(), %reply_id, url, "thread closed with reply");
                })
        } else {
            debug!(channel = self.kind(), url, "replies disabled, closing silently");
            Ok(())
        };

        // The record goes away even when the reply failed; close is attempted once
        let deleted = self.threads.delete(thread).await;

        match (replied, deleted) {
            (Err(reply_err), Err(delete_err)) => {
                warn!(channel = self.kind(), url, error = %delete_err, "thread not deleted");
                Err(reply_err)
            }
            (Err(reply_err), Ok(())) => Err(reply_err),
            (Ok(()), Err(delete_err)) => Err(self.thread_error(delete_err)),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}
