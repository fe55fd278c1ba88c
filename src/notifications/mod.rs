//! # Notifications
//!
//! Turns availability changes into messages on external channels and keeps
//! one persisted thread per (channel, product URL) so a sold-out reply can
//! answer the announcement it closes.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::detector::Change;
use crate::error::PersistenceError;

pub mod channel;
pub mod formatter;
pub mod telegram;
pub mod threaded;
pub mod webhook;

pub use channel::{Channel, MessageId};
pub use formatter::{Announcement, Hashtags};
pub use telegram::TelegramChannel;
pub use threaded::{ChannelPolicy, MessageStyle, ThreadedNotifier};
pub use webhook::WebhookChannel;

/// A channel send or its thread bookkeeping failed.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("{channel}: request failed: {details}")]
    Transport { channel: String, details: String },
    #[error("{channel}: upstream returned HTTP {status}: {body}")]
    Http {
        channel: String,
        status: u16,
        body: String,
    },
    #[error("{channel}: unexpected response: {details}")]
    Response { channel: String, details: String },
    #[error("{channel}: thread store failed: {source}")]
    Thread {
        channel: String,
        #[source]
        source: PersistenceError,
    },
    #[error("invalid channel configuration: {details}")]
    Configuration { details: String },
}

/// How a channel recognises that an announcement was already made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// One thread per product URL.
    #[default]
    ProductUrl,
    /// Identical announcement text reuses the thread and bumps a counter.
    ContentHash,
}

impl FromStr for DedupStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "product_url" | "url" => Ok(Self::ProductUrl),
            "content_hash" | "hash" => Ok(Self::ContentHash),
            other => Err(other.to_string()),
        }
    }
}

/// Contract the crawl pipeline notifies through.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify_available(&self, announcement: &Announcement<'_>) -> Result<(), NotifierError>;

    async fn notify_unavailable(&self, url: &str, elapsed: Duration) -> Result<(), NotifierError>;
}

/// Outcome of one dispatch across all notifiers.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<NotifierError>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fans a change out to every registered notifier.
///
/// Notifiers are independent: one failing never stops the others.
#[derive(Default, Clone)]
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// Dispatcher with no channels; every change is dropped.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Sends what `change` calls for. `elapsed` is only used to close threads.
    pub async fn dispatch(
        &self,
        change: Change,
        announcement: &Announcement<'_>,
        elapsed: Duration,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !change.opens_thread() && !change.closes_thread() {
            return report;
        }

        for notifier in &self.notifiers {
            let result = if change.opens_thread() {
                notifier.notify_available(announcement).await
            } else {
                notifier.notify_unavailable(announcement.url, elapsed).await
            };

            match result {
                Ok(()) => {
                    counter!("restock_notifications_sent_total", "channel" => notifier.name().to_string())
                        .increment(1);
                    info!(
                        channel = notifier.name(),
                        url = announcement.url,
                        change = %change,
                        "notification sent"
                    );
                    report.delivered += 1;
                }
                Err(err) => {
                    counter!("restock_notifications_failed_total", "channel" => notifier.name().to_string())
                        .increment(1);
                    error!(
                        channel = notifier.name(),
                        url = announcement.url,
                        change = %change,
                        error = %err,
                        "notification failed"
                    );
                    report.failures.push(err);
                }
            }
        }

        report
    }
}
