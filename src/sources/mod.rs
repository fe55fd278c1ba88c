//! Product sources
//!
//! A source reports raw observations for exactly one shop. Concrete sources
//! own their wire protocol; the crawl pipeline only sees [`ProductSource`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::models::Observation;

pub mod json_feed;
pub mod nvidia_fe;

pub use json_feed::JsonFeedSource;
pub use nvidia_fe::NvidiaFeSource;

/// A source failed to produce observations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_name}: upstream returned HTTP {status}")]
    Http { source_name: String, status: u16 },
    #[error("{source_name}: request failed: {details}")]
    Network {
        source_name: String,
        details: String,
    },
    #[error("{source_name}: malformed response: {details}")]
    MalformedResponse {
        source_name: String,
        details: String,
    },
    #[error("invalid source configuration: {details}")]
    Configuration { details: String },
    #[error("cannot extract shop name from '{url}': {details}")]
    ShopName { url: String, details: String },
}

impl SourceError {
    pub(crate) fn from_reqwest(source_name: &str, err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                source_name: source_name.to_string(),
                status: status.as_u16(),
            },
            None if err.is_decode() => Self::MalformedResponse {
                source_name: source_name.to_string(),
                details: err.to_string(),
            },
            None => Self::Network {
                source_name: source_name.to_string(),
                details: err.to_string(),
            },
        }
    }
}

/// Contract every product source implements.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Human-readable label used in logs (e.g. `JsonFeedSource<https://...>`).
    fn label(&self) -> String;

    /// Name of the shop every observation belongs to.
    fn shop_name(&self) -> Result<String, SourceError>;

    /// Fetches the current observations.
    async fn parse(&self) -> Result<Vec<Observation>, SourceError>;
}

/// Derives a shop name from a URL: host without leading `www.`, lowercased.
///
/// `https://www.ldlc.com/informatique/...` becomes `ldlc.com`.
pub fn extract_shop_name(link: &str) -> Result<String, SourceError> {
    let parsed = Url::parse(link).map_err(|e| SourceError::ShopName {
        url: link.to_string(),
        details: e.to_string(),
    })?;
    let host = parsed.host_str().ok_or_else(|| SourceError::ShopName {
        url: link.to_string(),
        details: "url has no host".to_string(),
    })?;
    let host = host.to_lowercase();
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Groups links by shop name, skipping links without one.
pub fn group_by_shop(links: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut shops: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for link in links {
        match extract_shop_name(link) {
            Ok(name) => shops.entry(name).or_default().push(link.clone()),
            Err(e) => tracing::warn!(url = %link, error = %e, "skipping url"),
        }
    }
    shops
}
