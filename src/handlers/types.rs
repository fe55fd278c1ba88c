//! Response bodies shared by the catalog endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{product, shop};

/// Shop information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShopInfo {
    /// Shop identifier
    pub id: i32,
    /// Shop name derived from the source host (e.g., "ldlc.com")
    pub name: String,
}

impl From<shop::Model> for ShopInfo {
    fn from(model: shop::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

/// Product information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductInfo {
    pub id: i32,
    pub name: String,
    /// Unique product URL
    pub url: String,
    pub price: f64,
    /// ISO currency code, may be empty for sold out products
    pub price_currency: String,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    /// Last time a crawl saw this product
    pub updated_at: DateTime<Utc>,
    /// Shop the product belongs to
    pub shop: Option<ShopInfo>,
}

impl From<(product::Model, Option<shop::Model>)> for ProductInfo {
    fn from((model, shop): (product::Model, Option<shop::Model>)) -> Self {
        Self {
            id: model.id,
            name: model.name,
            url: model.url,
            price: model.price,
            price_currency: model.price_currency,
            available: model.available,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
            shop: shop.map(ShopInfo::from),
        }
    }
}

/// Response containing the list of shops
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShopsResponse {
    pub shops: Vec<ShopInfo>,
}

/// Response containing the list of products
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductsResponse {
    pub products: Vec<ProductInfo>,
}
