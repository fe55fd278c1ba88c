//! Raw product observations as reported by sources.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One reported snapshot of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, alias = "priceCurrency")]
    pub price_currency: String,
    #[serde(default)]
    pub available: bool,
}

impl Observation {
    /// Checks the product validity invariant.
    ///
    /// Name and URL must be set, and an available product must carry a
    /// currency so its price can be rendered and converted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName {
                url: self.url.clone(),
            });
        }
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingUrl {
                name: self.name.clone(),
            });
        }
        if self.available && self.price_currency.is_empty() {
            return Err(ValidationError::MissingCurrency {
                url: self.url.clone(),
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(name: &str, url: &str, currency: &str, available: bool) -> Observation {
        Observation {
            name: name.to_string(),
            url: url.to_string(),
            price: 699.99,
            price_currency: currency.to_string(),
            available,
        }
    }

    #[test]
    fn complete_observation_is_valid() {
        assert!(observation("RTX 3080", "https://x/1", "USD", true).is_valid());
    }

    #[test]
    fn missing_name_or_url_is_invalid() {
        assert!(matches!(
            observation("", "https://x/1", "USD", true).validate(),
            Err(ValidationError::MissingName { .. })
        ));
        assert!(matches!(
            observation("RTX 3080", "", "USD", true).validate(),
            Err(ValidationError::MissingUrl { .. })
        ));
    }

    #[test]
    fn available_product_requires_currency() {
        assert!(matches!(
            observation("RTX 3080", "https://x/1", "", true).validate(),
            Err(ValidationError::MissingCurrency { .. })
        ));
        // Sold out listings often omit the price entirely
        assert!(observation("RTX 3080", "https://x/1", "", false).is_valid());
    }

    #[test]
    fn deserializes_feed_item_with_defaults() {
        let item: Observation = serde_json::from_str(
            r#"{"name":"RTX 3080","url":"https://x/1","priceCurrency":"EUR","available":true}"#,
        )
        .unwrap();
        assert_eq!(item.price, 0.0);
        assert_eq!(item.price_currency, "EUR");
        assert!(item.available);
    }
}
