//! # Crawl Scheduler
//!
//! Runs every configured product source exactly once per invocation with at
//! most `workers` sources in flight. A source that fails, or whose task
//! panics, is logged and counted without affecting its siblings.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::crawler::{CrawlStats, Crawler};
use crate::sources::ProductSource;

/// Outcome of one crawl cycle.
#[derive(Debug, Default)]
pub struct RunReport {
    pub sources: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stats: CrawlStats,
}

/// Bounded-concurrency driver over a set of product sources.
pub struct CrawlScheduler {
    crawler: Arc<Crawler>,
    workers: usize,
}

impl CrawlScheduler {
    pub fn new(crawler: Arc<Crawler>, workers: usize) -> Self {
        Self {
            crawler,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Crawls every source once and waits for all of them to finish.
    #[instrument(skip_all, fields(sources = sources.len(), workers = self.workers))]
    pub async fn run_once(&self, sources: Vec<Arc<dyn ProductSource>>) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport {
            sources: sources.len(),
            ..Default::default()
        };

        if sources.is_empty() {
            warn!("no product sources configured, nothing to crawl");
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(sources.len());

        for source in sources {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "worker pool closed, stopping crawl");
                    break;
                }
            };
            let crawler = self.crawler.clone();
            let label = source.label();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                crawler.crawl_source(source.as_ref()).await
            });
            handles.push((label, handle));
        }

        for (label, handle) in handles {
            match handle.await {
                Ok(Ok(stats)) => {
                    counter!("restock_sources_crawled_total").increment(1);
                    report.succeeded += 1;
                    report.stats += &stats;
                }
                Ok(Err(e)) => {
                    counter!("restock_sources_failed_total").increment(1);
                    report.failed += 1;
                    error!(source = %label, error = %e, "source crawl failed");
                }
                Err(e) => {
                    counter!("restock_sources_failed_total").increment(1);
                    report.failed += 1;
                    error!(source = %label, error = %e, "source task panicked or was cancelled");
                }
            }
        }

        let elapsed = started.elapsed();
        histogram!("restock_crawl_duration_seconds").record(elapsed.as_secs_f64());

        info!(
            sources = report.sources,
            succeeded = report.succeeded,
            failed = report.failed,
            processed = report.stats.processed(),
            notification_failures = report.stats.notification_failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "crawl cycle completed"
        );

        report
    }
}
