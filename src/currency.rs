//! Foreign exchange conversion with a process-lifetime rate cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("invalid currency pair (from='{from}', to='{to}')")]
    InvalidCurrency { from: String, to: String },
    #[error("rate for {from}{to} unavailable: {reason}")]
    RateUnavailable {
        from: String,
        to: String,
        reason: String,
    },
}

/// Where exchange rates come from.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Returns how many `to` one unit of `from` buys. Codes are lowercase.
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, CurrencyError>;
}

/// Rate source backed by the public currency-api JSON files.
///
/// `GET {base}/currencies/{from}/{to}.json` answers
/// `{"date": "2021-05-22", "usd": 1.218125}`.
pub struct HttpRateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, CurrencyError> {
        let unavailable = |reason: String| CurrencyError::RateUnavailable {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let url = format!("{}/currencies/{}/{}.json", self.base_url, from, to);
        debug!(%url, "fetching exchange rate");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        body.get(to)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| unavailable(format!("response has no numeric '{}' field", to)))
    }
}

/// Converts amounts between currencies, caching each pair's rate forever.
///
/// Concurrent misses on the same pair may both fetch; the last write wins.
pub struct CurrencyConverter {
    source: Arc<dyn RateSource>,
    rates: RwLock<HashMap<(String, String), f64>>,
}

impl CurrencyConverter {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        Self {
            source,
            rates: RwLock::new(HashMap::new()),
        }
    }

    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, CurrencyError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }

        if from.is_empty() || to.is_empty() {
            return Err(CurrencyError::InvalidCurrency {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let pair = (from.to_lowercase(), to.to_lowercase());

        if let Some(rate) = self.cached_rate(&pair) {
            return Ok(rate * amount);
        }

        let rate = self.source.fetch_rate(&pair.0, &pair.1).await?;
        if let Ok(mut rates) = self.rates.write() {
            rates.insert(pair, rate);
        }

        Ok(rate * amount)
    }

    fn cached_rate(&self, pair: &(String, String)) -> Option<f64> {
        self.rates.read().ok()?.get(pair).copied()
    }

    /// Number of cached currency pairs.
    pub fn cached_pairs(&self) -> usize {
        self.rates.read().map(|rates| rates.len()).unwrap_or(0)
    }
}
