//! Per-source crawl pipeline.
//!
//! One source is processed at a time per task: fetch, filter, then for each
//! observation upsert, classify, persist and notify. Persistence always
//! completes before any notification for the same observation goes out.

use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::detector::{self, Change};
use crate::error::PersistenceError;
use crate::filters::FilterPipeline;
use crate::models::{Observation, product, shop};
use crate::notifications::{Announcement, NotificationDispatcher};
use crate::repositories::CatalogRepository;
use crate::sources::{ProductSource, SourceError};

/// Errors that abort one source for the current cycle.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Counters for one source run, summed across a cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlStats {
    pub observed: u64,
    pub filtered_out: u64,
    pub invalid: u64,
    pub created: u64,
    pub became_available: u64,
    pub became_unavailable: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub persistence_failures: u64,
    pub notification_failures: u64,
}

impl CrawlStats {
    /// Observations that went through the catalog successfully.
    pub fn processed(&self) -> u64 {
        self.created + self.became_available + self.became_unavailable + self.updated + self.unchanged
    }

    fn record(&mut self, change: Change) {
        match change {
            Change::Created => self.created += 1,
            Change::BecameAvailable => self.became_available += 1,
            Change::BecameUnavailable => self.became_unavailable += 1,
            Change::Updated => self.updated += 1,
            Change::NoOp => self.unchanged += 1,
        }
    }
}

impl AddAssign<&CrawlStats> for CrawlStats {
    fn add_assign(&mut self, other: &CrawlStats) {
        self.observed += other.observed;
        self.filtered_out += other.filtered_out;
        self.invalid += other.invalid;
        self.created += other.created;
        self.became_available += other.became_available;
        self.became_unavailable += other.became_unavailable;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.persistence_failures += other.persistence_failures;
        self.notification_failures += other.notification_failures;
    }
}

/// Serialises catalog writes for the same product URL across tasks.
///
/// Entries only live while some task holds or waits on them.
#[derive(Default)]
struct UrlLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UrlLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        // A poisoned map only means another task panicked mid-insert
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, url: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.map().entry(url.to_string()).or_default().clone()
    }

    /// Drops the entry for `url` when the caller's handle and the map's are
    /// the last two references.
    fn release(&self, url: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.map();
        let current = locks
            .get(url)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock));
        if current && Arc::strong_count(&lock) == 2 {
            locks.remove(url);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

/// Runs sources through filters, the catalog and the notification dispatcher.
pub struct Crawler {
    catalog: CatalogRepository,
    filters: FilterPipeline,
    dispatcher: NotificationDispatcher,
    url_locks: UrlLocks,
}

impl Crawler {
    pub fn new(
        catalog: CatalogRepository,
        filters: FilterPipeline,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            catalog,
            filters,
            dispatcher,
            url_locks: UrlLocks::default(),
        }
    }

    /// Crawls one source end to end.
    ///
    /// Fails only when the source itself or its shop lookup fails; problems
    /// with single observations are logged and counted.
    #[instrument(skip_all, fields(source = %source.label()))]
    pub async fn crawl_source(&self, source: &dyn ProductSource) -> Result<CrawlStats, CrawlError> {
        let shop_name = source.shop_name()?;
        let shop = self.catalog.get_or_create_shop(&shop_name).await?;

        let observations = source.parse().await?;
        let mut stats = CrawlStats {
            observed: observations.len() as u64,
            ..Default::default()
        };

        let kept = self.filters.apply(observations).await;
        stats.filtered_out = stats.observed - kept.len() as u64;

        for observation in &kept {
            if let Err(e) = observation.validate() {
                debug!(shop = %shop.name, error = %e, "discarding invalid observation");
                counter!("restock_observations_discarded_total", "shop" => shop.name.clone())
                    .increment(1);
                stats.invalid += 1;
                continue;
            }

            self.process_observation(&shop, observation, &mut stats).await;
        }

        info!(
            shop = %shop.name,
            observed = stats.observed,
            processed = stats.processed(),
            filtered_out = stats.filtered_out,
            invalid = stats.invalid,
            "source crawled"
        );

        Ok(stats)
    }

    async fn process_observation(
        &self,
        shop: &shop::Model,
        observation: &Observation,
        stats: &mut CrawlStats,
    ) {
        let lock = self.url_locks.get(&observation.url);
        let guard = lock.lock().await;
        self.process_locked(shop, observation, stats).await;
        drop(guard);
        self.url_locks.release(&observation.url, lock);
    }

    async fn process_locked(
        &self,
        shop: &shop::Model,
        observation: &Observation,
        stats: &mut CrawlStats,
    ) {
        let (change, elapsed) = match self.persist(shop, observation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    shop = %shop.name,
                    url = %observation.url,
                    error = %e,
                    "persisting observation failed, skipping notification"
                );
                stats.persistence_failures += 1;
                return;
            }
        };

        stats.record(change);
        counter!("restock_observations_processed_total", "change" => change.as_str())
            .increment(1);

        if !change.opens_thread() && !change.closes_thread() {
            return;
        }

        debug!(shop = %shop.name, url = %observation.url, change = %change, "availability changed");

        let announcement = Announcement {
            shop_name: &shop.name,
            product_name: &observation.name,
            price: observation.price,
            currency: &observation.price_currency,
            url: &observation.url,
        };
        let report = self.dispatcher.dispatch(change, &announcement, elapsed).await;
        stats.notification_failures += report.failures.len() as u64;
    }

    /// Writes the observation to the catalog and classifies it.
    ///
    /// Returns the change along with the time since the product was last
    /// written, taken before this pass touched it.
    async fn persist(
        &self,
        shop: &shop::Model,
        observation: &Observation,
    ) -> Result<(Change, Duration), PersistenceError> {
        let (stored, was_new) = self.catalog.upsert_product(observation, shop).await?;
        let change = detector::detect(was_new, &stored, observation);
        let elapsed = since(&stored);

        if was_new {
            return Ok((change, elapsed));
        }

        let (_, written) = self.catalog.merge(stored.clone(), observation).await?;
        if !written {
            self.catalog.heartbeat(stored).await?;
        }

        Ok((change, elapsed))
    }
}

fn since(product: &product::Model) -> Duration {
    let elapsed = Utc::now().signed_duration_since(product.updated_at);
    elapsed.to_std().unwrap_or_else(|_| {
        warn!(url = %product.url, "product updated in the future, clock skew?");
        Duration::ZERO
    })
}
