//! JSON feed source.
//!
//! Reads a JSON array of observations from a URL, the format the headless
//! browser scraping service hands its results back in.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ProductSource, SourceError, extract_shop_name};
use crate::models::Observation;

pub struct JsonFeedSource {
    url: String,
    client: reqwest::Client,
}

impl JsonFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let url = url.into();
        extract_shop_name(&url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Configuration {
                details: e.to_string(),
            })?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl ProductSource for JsonFeedSource {
    fn label(&self) -> String {
        format!("JsonFeedSource<{}>", self.url)
    }

    fn shop_name(&self) -> Result<String, SourceError> {
        extract_shop_name(&self.url)
    }

    async fn parse(&self) -> Result<Vec<Observation>, SourceError> {
        let label = self.label();
        debug!(url = %self.url, "fetching product feed");

        self.client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::from_reqwest(&label, e))?
            .json::<Vec<Observation>>()
            .await
            .map_err(|e| SourceError::from_reqwest(&label, e))
    }
}
