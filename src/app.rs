//! # Composition
//!
//! Builds sources, filters and notifiers from [`AppConfig`] and runs one
//! crawl cycle over them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::crawler::Crawler;
use crate::currency::{CurrencyConverter, HttpRateSource};
use crate::filters::FilterPipeline;
use crate::notifications::{
    ChannelPolicy, DedupStrategy, Hashtags, MessageStyle, NotificationDispatcher, Notifier,
    NotifierError, TelegramChannel, ThreadedNotifier, WebhookChannel,
};
use crate::repositories::{CatalogRepository, ThreadRepository};
use crate::scheduler::{CrawlScheduler, RunReport};
use crate::sources::{JsonFeedSource, NvidiaFeSource, ProductSource, SourceError, group_by_shop};

/// One source per configured URL plus one NVIDIA source per location.
pub fn build_sources(config: &AppConfig) -> Result<Vec<Arc<dyn ProductSource>>, SourceError> {
    let timeout = Duration::from_secs(config.crawl.http_timeout_seconds);
    let mut sources: Vec<Arc<dyn ProductSource>> = Vec::new();

    for (shop, urls) in group_by_shop(&config.crawl.urls) {
        info!(%shop, urls = urls.len(), "shop configured");
        for url in urls {
            sources.push(Arc::new(JsonFeedSource::new(url, timeout)?));
        }
    }

    if let Some(nvidia) = &config.nvidia_fe {
        let timeout = Duration::from_secs(nvidia.timeout_seconds);
        for location in &nvidia.locations {
            sources.push(Arc::new(NvidiaFeSource::new(
                location,
                &nvidia.gpus,
                &nvidia.user_agent,
                &nvidia.api_base,
                timeout,
            )?));
        }
    }

    Ok(sources)
}

/// Notifiers for every configured channel, or none when notifications are disabled.
pub fn build_dispatcher(
    config: &AppConfig,
    db: Arc<DatabaseConnection>,
) -> Result<NotificationDispatcher, NotifierError> {
    if config.crawl.disable_notifications {
        info!("notifications disabled");
        return Ok(NotificationDispatcher::disabled());
    }

    let timeout = Duration::from_secs(config.crawl.http_timeout_seconds);
    let threads = ThreadRepository::new(db);
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(telegram) = &config.telegram {
        let channel = TelegramChannel::new(telegram, timeout)?;
        let policy = ChannelPolicy {
            dedup: DedupStrategy::ProductUrl,
            enable_replies: telegram.enable_replies,
            style: MessageStyle::Telegram,
            hashtags: Hashtags::default(),
        };
        notifiers.push(Arc::new(ThreadedNotifier::new(
            Arc::new(channel),
            policy,
            threads.clone(),
        )));
    }

    if let Some(webhook) = &config.webhook {
        let channel = WebhookChannel::new(&webhook.url, timeout)?;
        let hashtags =
            Hashtags::new(&webhook.hashtags).map_err(|e| NotifierError::Configuration {
                details: e.to_string(),
            })?;
        let policy = ChannelPolicy {
            dedup: webhook.dedup,
            enable_replies: webhook.enable_replies,
            style: MessageStyle::Compact {
                max_length: webhook.max_length,
            },
            hashtags,
        };
        notifiers.push(Arc::new(ThreadedNotifier::new(
            Arc::new(channel),
            policy,
            threads.clone(),
        )));
    }

    if notifiers.is_empty() {
        warn!("no notification channel configured");
    }

    Ok(NotificationDispatcher::new(notifiers))
}

/// Wires the crawl pipeline against `db`.
pub fn build_crawler(config: &AppConfig, db: Arc<DatabaseConnection>) -> Result<Crawler> {
    let rates = HttpRateSource::new(
        config.crawl.currency_api_base.as_str(),
        Duration::from_secs(config.crawl.http_timeout_seconds),
    )
    .context("Failed to build currency client")?;
    let converter = Arc::new(CurrencyConverter::new(Arc::new(rates)));

    let filters = FilterPipeline::from_config(&config.crawl, converter)
        .context("Failed to build filters")?;
    let dispatcher =
        build_dispatcher(config, db.clone()).context("Failed to build notifiers")?;

    Ok(Crawler::new(CatalogRepository::new(db), filters, dispatcher))
}

/// Purges stale threads, then crawls every configured source once.
pub async fn run_crawl(config: &AppConfig, db: Arc<DatabaseConnection>) -> Result<RunReport> {
    if config.thread_retention_days > 0 {
        let purged = ThreadRepository::new(db.clone())
            .purge_older_than(config.thread_retention_days)
            .await
            .context("Failed to purge notification threads")?;
        if purged > 0 {
            info!(purged, retention_days = config.thread_retention_days, "stale threads purged");
        }
    }

    let sources = build_sources(config).context("Failed to build product sources")?;
    let crawler = Arc::new(build_crawler(config, db)?);
    let scheduler = CrawlScheduler::new(crawler, config.crawl.workers);

    Ok(scheduler.run_once(sources).await)
}
