//! Liveness check over the catalog.
//!
//! Each shop is judged by its most recently updated product. The overall
//! status is the worst shop status and maps to the usual monitoring plugin
//! exit codes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::MonitorConfig;
use crate::repositories::CatalogRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LivenessStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl LivenessStatus {
    pub fn code(self) -> i32 {
        match self {
            LivenessStatus::Ok => 0,
            LivenessStatus::Warning => 1,
            LivenessStatus::Critical => 2,
            LivenessStatus::Unknown => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LivenessStatus::Ok => "OK",
            LivenessStatus::Warning => "WARN",
            LivenessStatus::Critical => "CRIT",
            LivenessStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Status of one shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopLiveness {
    pub shop: String,
    pub last_update: Option<DateTime<Utc>>,
    pub status: LivenessStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessReport {
    pub status: LivenessStatus,
    pub shops: Vec<ShopLiveness>,
    pub error: Option<String>,
}

impl LivenessReport {
    pub fn unknown(error: String) -> Self {
        Self {
            status: LivenessStatus::Unknown,
            shops: Vec::new(),
            error: Some(error),
        }
    }

    pub fn code(&self) -> i32 {
        self.status.code()
    }

    /// Names of the shops sharing the overall status.
    pub fn offenders(&self) -> Vec<&str> {
        self.shops
            .iter()
            .filter(|s| s.status == self.status)
            .map(|s| s.shop.as_str())
            .collect()
    }
}

impl fmt::Display for LivenessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            LivenessStatus::Ok => write!(f, "OK - All shops have been updated recently"),
            LivenessStatus::Unknown => write!(
                f,
                "UNKNOWN - {}",
                self.error.as_deref().unwrap_or("no status available")
            ),
            status => write!(f, "{} - {}", status.label(), self.offenders().join(", ")),
        }
    }
}

pub struct LivenessMonitor {
    catalog: CatalogRepository,
    warning: Duration,
    critical: Duration,
}

impl LivenessMonitor {
    pub fn new(catalog: CatalogRepository, config: &MonitorConfig) -> Self {
        Self {
            catalog,
            warning: Duration::from_secs(config.warning_seconds),
            critical: Duration::from_secs(config.critical_seconds),
        }
    }

    /// Classifies a shop by the age of its freshest product.
    pub fn classify(&self, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LivenessStatus {
        let Some(last_update) = last_update else {
            return LivenessStatus::Critical;
        };
        let age = now
            .signed_duration_since(last_update)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if age > self.critical {
            LivenessStatus::Critical
        } else if age > self.warning {
            LivenessStatus::Warning
        } else {
            LivenessStatus::Ok
        }
    }

    pub async fn check(&self) -> LivenessReport {
        self.check_at(Utc::now()).await
    }

    pub async fn check_at(&self, now: DateTime<Utc>) -> LivenessReport {
        let latest = match self.catalog.latest_update_per_shop().await {
            Ok(latest) => latest,
            Err(e) => return LivenessReport::unknown(e.to_string()),
        };

        let shops: Vec<ShopLiveness> = latest
            .into_iter()
            .map(|(shop, updated_at)| {
                let last_update = updated_at.map(|t| t.with_timezone(&Utc));
                let status = self.classify(last_update, now);
                debug!(shop = %shop.name, ?last_update, ?status, "shop liveness");
                ShopLiveness {
                    shop: shop.name,
                    last_update,
                    status,
                }
            })
            .collect();

        let status = shops
            .iter()
            .map(|s| s.status)
            .max()
            .unwrap_or(LivenessStatus::Ok);

        LivenessReport {
            status,
            shops,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop(name: &str, status: LivenessStatus) -> ShopLiveness {
        ShopLiveness {
            shop: name.to_string(),
            last_update: None,
            status,
        }
    }

    #[test]
    fn codes_follow_monitoring_convention() {
        assert_eq!(LivenessStatus::Ok.code(), 0);
        assert_eq!(LivenessStatus::Warning.code(), 1);
        assert_eq!(LivenessStatus::Critical.code(), 2);
        assert_eq!(LivenessStatus::Unknown.code(), 3);
    }

    #[test]
    fn report_lists_shops_at_worst_level() {
        let report = LivenessReport {
            status: LivenessStatus::Warning,
            shops: vec![
                shop("a.com", LivenessStatus::Warning),
                shop("b.com", LivenessStatus::Ok),
                shop("c.com", LivenessStatus::Warning),
            ],
            error: None,
        };
        assert_eq!(report.to_string(), "WARN - a.com, c.com");
        assert_eq!(report.code(), 1);
    }

    #[test]
    fn ok_and_unknown_lines() {
        let ok = LivenessReport {
            status: LivenessStatus::Ok,
            shops: vec![shop("a.com", LivenessStatus::Ok)],
            error: None,
        };
        assert_eq!(ok.to_string(), "OK - All shops have been updated recently");

        let unknown = LivenessReport::unknown("database is locked".to_string());
        assert_eq!(unknown.to_string(), "UNKNOWN - database is locked");
        assert_eq!(unknown.code(), 3);
    }
}
