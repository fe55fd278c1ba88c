//! NVIDIA Founders Edition store inventory source.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ProductSource, SourceError};
use crate::models::Observation;

/// GPU model to store SKU.
const SKUS: &[(&str, &str)] = &[
    ("RTX 3060 Ti", "NVGFT060T"),
    ("RTX 3070", "NVGFT070"),
    ("RTX 3070 Ti", "NVGFT070T"),
    ("RTX 3080", "NVGFT080"),
    ("RTX 3080 Ti", "NVGFT080T"),
    ("RTX 3090", "NVGFT090"),
    ("RTX 3090 Ti", "NVGFT090T"),
];

/// Store location to listing currency.
const LOCATIONS: &[(&str, &str)] = &[("es", "EUR"), ("fr", "EUR"), ("it", "EUR")];

const STORE_URL: &str = "https://store.nvidia.com";

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    success: bool,
    #[serde(rename = "listMap", default)]
    list_map: Vec<InventoryListing>,
}

#[derive(Debug, Deserialize)]
struct InventoryListing {
    is_active: String,
    price: String,
}

/// Queries the inventory API once per GPU for a single store location.
pub struct NvidiaFeSource {
    location: String,
    currency: &'static str,
    gpus: Vec<(String, &'static str)>,
    user_agent: String,
    api_base: String,
    client: reqwest::Client,
}

impl NvidiaFeSource {
    pub fn new(
        location: &str,
        gpus: &[String],
        user_agent: &str,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let currency = LOCATIONS
            .iter()
            .find(|(loc, _)| *loc == location)
            .map(|(_, currency)| *currency)
            .ok_or_else(|| SourceError::Configuration {
                details: format!(
                    "location {} not supported, expected one of {:?}",
                    location,
                    LOCATIONS.iter().map(|(l, _)| *l).collect::<Vec<_>>()
                ),
            })?;

        let gpus = gpus
            .iter()
            .map(|gpu| {
                SKUS.iter()
                    .find(|(model, _)| model == gpu)
                    .map(|(_, sku)| (gpu.clone(), *sku))
                    .ok_or_else(|| SourceError::Configuration {
                        details: format!(
                            "GPU {} not supported, expected one of {:?}",
                            gpu,
                            SKUS.iter().map(|(m, _)| *m).collect::<Vec<_>>()
                        ),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // The API rejects requests without a browser user agent
        if user_agent.trim().is_empty() {
            return Err(SourceError::Configuration {
                details: "user agent required (use the one of your web browser)".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Configuration {
                details: e.to_string(),
            })?;

        Ok(Self {
            location: location.to_string(),
            currency,
            gpus,
            user_agent: user_agent.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn locale(&self) -> String {
        format!("{0}-{0}", self.location)
    }

    /// Store page listing one GPU model, used as the product URL.
    pub fn product_url(&self, gpu: &str) -> String {
        let locale = self.locale();
        let mut url = match Url::parse(STORE_URL) {
            Ok(url) => url,
            Err(_) => return format!("{}/{}/geforce/store/gpu/", STORE_URL, locale),
        };
        url.set_path(&format!("{}/geforce/store/gpu/", locale));
        url.query_pairs_mut()
            .append_pair("page", "1")
            .append_pair("limit", "100")
            .append_pair("locale", &locale)
            .append_pair("category", "GPU")
            .append_pair("gpu", gpu)
            .append_pair("manufacturer", "NVIDIA");
        url.to_string()
    }

    async fn fetch_gpu(&self, gpu: &str, sku: &str) -> Result<Vec<Observation>, SourceError> {
        let label = self.label();
        let url = format!("{}/partner/v1/feinventory", self.api_base);
        debug!(%url, gpu, sku, "requesting NVIDIA inventory");

        let response: InventoryResponse = self
            .client
            .get(&url)
            .query(&[("status", "1"), ("skus", sku), ("locale", &self.locale())])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::from_reqwest(&label, e))?
            .json()
            .await
            .map_err(|e| SourceError::from_reqwest(&label, e))?;

        if !response.success {
            return Err(SourceError::MalformedResponse {
                source_name: label,
                details: format!("applicative failure for GPU {}", gpu),
            });
        }

        response
            .list_map
            .into_iter()
            .map(|listing| {
                let available: bool =
                    listing
                        .is_active
                        .parse()
                        .map_err(|_| SourceError::MalformedResponse {
                            source_name: label.clone(),
                            details: format!("is_active '{}' is not a boolean", listing.is_active),
                        })?;
                let price: f64 =
                    listing
                        .price
                        .parse()
                        .map_err(|_| SourceError::MalformedResponse {
                            source_name: label.clone(),
                            details: format!("price '{}' is not a number", listing.price),
                        })?;
                Ok(Observation {
                    name: gpu.to_string(),
                    url: self.product_url(gpu),
                    price,
                    price_currency: self.currency.to_string(),
                    available,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProductSource for NvidiaFeSource {
    fn label(&self) -> String {
        format!("NvidiaFeSource<{}>", self.location)
    }

    fn shop_name(&self) -> Result<String, SourceError> {
        Ok(format!("nvidia.com/{}/shop", self.locale()))
    }

    async fn parse(&self) -> Result<Vec<Observation>, SourceError> {
        let mut observations = Vec::new();
        for (gpu, sku) in &self.gpus {
            observations.extend(self.fetch_gpu(gpu, sku).await?);
        }
        Ok(observations)
    }
}
