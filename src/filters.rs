//! Observation filters applied before anything reaches the catalog.
//!
//! The pipeline runs include, exclude, then price range filters; an
//! observation rejected by any stage is dropped from the batch.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CrawlConfig;
use crate::currency::CurrencyConverter;
use crate::models::Observation;

/// Currency used by range filters configured without one.
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Error)]
#[error("invalid filter pattern '{pattern}': {source}")]
pub struct FilterError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

fn compile(pattern: &str) -> Result<Option<Regex>, FilterError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|source| FilterError {
            pattern: pattern.to_string(),
            source,
        })
}

#[async_trait]
pub trait Filter: Send + Sync {
    /// Returns true when the observation should be kept.
    async fn include(&self, observation: &Observation) -> bool;
}

/// Keeps only observations whose name matches the pattern.
pub struct IncludeFilter {
    regex: Option<Regex>,
}

impl IncludeFilter {
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        Ok(Self {
            regex: compile(pattern)?,
        })
    }
}

#[async_trait]
impl Filter for IncludeFilter {
    async fn include(&self, observation: &Observation) -> bool {
        let Some(regex) = &self.regex else {
            return true;
        };
        let matched = regex.is_match(&observation.name);
        if !matched {
            debug!(name = %observation.name, "excluded: does not match include pattern");
        }
        matched
    }
}

/// Drops observations whose name matches the pattern.
pub struct ExcludeFilter {
    regex: Option<Regex>,
}

impl ExcludeFilter {
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        Ok(Self {
            regex: compile(pattern)?,
        })
    }
}

#[async_trait]
impl Filter for ExcludeFilter {
    async fn include(&self, observation: &Observation) -> bool {
        let Some(regex) = &self.regex else {
            return true;
        };
        let matched = regex.is_match(&observation.name);
        if matched {
            debug!(name = %observation.name, "excluded: matches exclude pattern");
        }
        !matched
    }
}

/// Bounds the price of products whose name matches a model pattern.
///
/// Prices are converted into the filter currency first. When conversion
/// fails the observation is kept. A `max` of 0 leaves the range open above.
pub struct RangeFilter {
    model: Option<Regex>,
    min: f64,
    max: f64,
    currency: String,
    converter: Arc<CurrencyConverter>,
}

impl RangeFilter {
    pub fn new(
        model: &str,
        min: f64,
        max: f64,
        currency: &str,
        converter: Arc<CurrencyConverter>,
    ) -> Result<Self, FilterError> {
        let currency = if currency.is_empty() {
            DEFAULT_CURRENCY.to_string()
        } else {
            currency.to_string()
        };
        Ok(Self {
            model: compile(model)?,
            min,
            max,
            currency,
            converter,
        })
    }

    fn in_range(&self, price: f64) -> bool {
        if self.max == 0.0 {
            return price >= self.min;
        }
        self.min <= price && price <= self.max
    }
}

#[async_trait]
impl Filter for RangeFilter {
    async fn include(&self, observation: &Observation) -> bool {
        let Some(model) = &self.model else {
            return true;
        };
        if !model.is_match(&observation.name) {
            return true;
        }

        let converted = match self
            .converter
            .convert(observation.price, &observation.price_currency, &self.currency)
            .await
        {
            Ok(price) => price,
            Err(e) => {
                warn!(
                    name = %observation.name,
                    price = observation.price,
                    currency = %observation.price_currency,
                    target = %self.currency,
                    error = %e,
                    "price conversion failed, keeping product"
                );
                return true;
            }
        };

        let included = self.in_range(converted);
        if !included {
            debug!(
                name = %observation.name,
                price = converted,
                currency = %self.currency,
                "excluded: price outside range"
            );
        }
        included
    }
}

/// Ordered chain of filters.
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Builds include, exclude and one range filter per configured price range.
    pub fn from_config(
        config: &CrawlConfig,
        converter: Arc<CurrencyConverter>,
    ) -> Result<Self, FilterError> {
        let mut pipeline = Self::new()
            .with(IncludeFilter::new(&config.include_regex)?)
            .with(ExcludeFilter::new(&config.exclude_regex)?);
        for range in &config.price_ranges {
            pipeline = pipeline.with(RangeFilter::new(
                &range.model,
                range.min,
                range.max,
                &range.currency,
                converter.clone(),
            )?);
        }
        Ok(pipeline)
    }

    pub async fn accepts(&self, observation: &Observation) -> bool {
        for filter in &self.filters {
            if !filter.include(observation).await {
                return false;
            }
        }
        true
    }

    /// Returns the observations every filter accepts, preserving order.
    pub async fn apply(&self, observations: Vec<Observation>) -> Vec<Observation> {
        let mut kept = Vec::with_capacity(observations.len());
        for observation in observations {
            if self.accepts(&observation).await {
                kept.push(observation);
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::{CurrencyError, RateSource};

    struct FixedRate(f64);

    #[async_trait]
    impl RateSource for FixedRate {
        async fn fetch_rate(&self, _from: &str, _to: &str) -> Result<f64, CurrencyError> {
            Ok(self.0)
        }
    }

    struct FailingRate;

    #[async_trait]
    impl RateSource for FailingRate {
        async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, CurrencyError> {
            Err(CurrencyError::RateUnavailable {
                from: from.to_string(),
                to: to.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn product(name: &str, price: f64, currency: &str) -> Observation {
        Observation {
            name: name.to_string(),
            url: format!("https://shop.example/{}", name.replace(' ', "-")),
            price,
            price_currency: currency.to_string(),
            available: true,
        }
    }

    fn usd_converter() -> Arc<CurrencyConverter> {
        Arc::new(CurrencyConverter::new(Arc::new(FixedRate(1.0))))
    }

    #[tokio::test]
    async fn empty_patterns_accept_everything() {
        let include = IncludeFilter::new("").unwrap();
        let exclude = ExcludeFilter::new("").unwrap();
        let range = RangeFilter::new("", 0.0, 1.0, "", usd_converter()).unwrap();
        let p = product("Anything", 9999.0, "USD");

        assert!(include.include(&p).await);
        assert!(exclude.include(&p).await);
        assert!(range.include(&p).await);
    }

    #[tokio::test]
    async fn include_and_exclude_match_on_name() {
        let include = IncludeFilter::new("(?i)rtx 30[0-9]0").unwrap();
        let exclude = ExcludeFilter::new("(?i)\\bti\\b").unwrap();

        assert!(include.include(&product("MSI RTX 3080", 1.0, "EUR")).await);
        assert!(!include.include(&product("RX 6800", 1.0, "EUR")).await);
        assert!(exclude.include(&product("RTX 3080", 1.0, "EUR")).await);
        assert!(!exclude.include(&product("RTX 3080 Ti", 1.0, "EUR")).await);
    }

    #[tokio::test]
    async fn range_bounds_are_inclusive() {
        let range = RangeFilter::new("3080", 700.0, 900.0, "USD", usd_converter()).unwrap();

        assert!(range.include(&product("RTX 3080", 700.0, "USD")).await);
        assert!(range.include(&product("RTX 3080", 900.0, "USD")).await);
        assert!(!range.include(&product("RTX 3080", 699.99, "USD")).await);
        assert!(!range.include(&product("RTX 3080", 900.01, "USD")).await);
        // Other models are out of scope for this filter
        assert!(range.include(&product("RTX 3070", 10_000.0, "USD")).await);
    }

    #[tokio::test]
    async fn zero_max_is_lower_bound_only() {
        let range = RangeFilter::new("3080", 700.0, 0.0, "USD", usd_converter()).unwrap();

        assert!(range.include(&product("RTX 3080", 700.0, "USD")).await);
        assert!(range.include(&product("RTX 3080", 5000.0, "USD")).await);
        assert!(!range.include(&product("RTX 3080", 699.99, "USD")).await);
    }

    #[tokio::test]
    async fn range_converts_into_filter_currency() {
        let converter = Arc::new(CurrencyConverter::new(Arc::new(FixedRate(2.0))));
        let range = RangeFilter::new("3080", 1000.0, 1500.0, "USD", converter).unwrap();

        // 600 EUR -> 1200 USD
        assert!(range.include(&product("RTX 3080", 600.0, "EUR")).await);
        // 400 EUR -> 800 USD
        assert!(!range.include(&product("RTX 3080", 400.0, "EUR")).await);
    }

    #[tokio::test]
    async fn conversion_failure_fails_open() {
        let converter = Arc::new(CurrencyConverter::new(Arc::new(FailingRate)));
        let range = RangeFilter::new("3080", 1000.0, 1500.0, "USD", converter).unwrap();

        assert!(range.include(&product("RTX 3080", 1.0, "EUR")).await);
    }

    #[tokio::test]
    async fn pipeline_drops_rejected_observations_in_order() {
        let pipeline = FilterPipeline::new()
            .with(IncludeFilter::new("RTX").unwrap())
            .with(ExcludeFilter::new("Ti").unwrap())
            .with(RangeFilter::new("3080", 700.0, 900.0, "USD", usd_converter()).unwrap());

        let kept = pipeline
            .apply(vec![
                product("RTX 3080", 800.0, "USD"),
                product("RTX 3080 Ti", 800.0, "USD"),
                product("RX 6800", 800.0, "USD"),
                product("RTX 3080 OC", 1200.0, "USD"),
                product("RTX 3070", 500.0, "USD"),
            ])
            .await;

        let names: Vec<_> = kept.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["RTX 3080", "RTX 3070"]);
    }

    #[test]
    fn rejects_invalid_pattern() {
        assert!(IncludeFilter::new("(").is_err());
    }
}
