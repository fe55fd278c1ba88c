//! Catalog repository for shops and products
//!
//! Owns product identity (the URL) and merge semantics. Every write is a
//! single-record statement; there are no cross-record transactions.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use crate::error::PersistenceError;
use crate::models::observation::Observation;
use crate::models::product::{self, Entity as Product};
use crate::models::shop::{self, Entity as Shop};

/// Repository for shop and product database operations
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    db: Arc<DatabaseConnection>,
}

impl CatalogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the shop named `name`, inserting it on first sight.
    ///
    /// A concurrent insert of the same name is resolved by re-reading the row.
    pub async fn get_or_create_shop(&self, name: &str) -> Result<shop::Model, PersistenceError> {
        if let Some(existing) = self.find_shop_by_name(name).await? {
            return Ok(existing);
        }

        let active = shop::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        };

        match active.insert(&*self.db).await {
            Ok(created) => {
                debug!(shop = %created.name, id = created.id, "shop created");
                Ok(created)
            }
            Err(err) if crate::error::is_unique_violation(&err) => self
                .find_shop_by_name(name)
                .await?
                .ok_or_else(|| PersistenceError::new(format!("create shop {}", name), err)),
            Err(err) => Err(PersistenceError::new(format!("create shop {}", name), err)),
        }
    }

    pub async fn find_shop_by_name(
        &self,
        name: &str,
    ) -> Result<Option<shop::Model>, PersistenceError> {
        Shop::find()
            .filter(shop::Column::Name.eq(name))
            .one(&*self.db)
            .await
            .map_err(PersistenceError::context(format!("find shop {}", name)))
    }

    pub async fn find_shop(&self, id: i32) -> Result<Option<shop::Model>, PersistenceError> {
        Shop::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(PersistenceError::context(format!("find shop {}", id)))
    }

    /// Lists all shops ordered by name.
    pub async fn list_shops(&self) -> Result<Vec<shop::Model>, PersistenceError> {
        Shop::find()
            .order_by_asc(shop::Column::Name)
            .all(&*self.db)
            .await
            .map_err(PersistenceError::context("list shops"))
    }

    /// Looks up the product by URL, creating it from the observation if absent.
    ///
    /// Returns the stored record untouched when it already exists, together
    /// with whether it was created by this call.
    pub async fn upsert_product(
        &self,
        observation: &Observation,
        shop: &shop::Model,
    ) -> Result<(product::Model, bool), PersistenceError> {
        if let Some(existing) = self.find_product_by_url(&observation.url).await? {
            return Ok((existing, false));
        }

        let now: DateTimeWithTimeZone = Utc::now().into();
        let active = product::ActiveModel {
            name: Set(observation.name.clone()),
            url: Set(observation.url.clone()),
            price: Set(observation.price),
            price_currency: Set(observation.price_currency.clone()),
            available: Set(observation.available),
            shop_id: Set(shop.id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let operation = || format!("create product {}", observation.url);
        match active.insert(&*self.db).await {
            Ok(created) => Ok((created, true)),
            Err(err) if crate::error::is_unique_violation(&err) => {
                let existing = self
                    .find_product_by_url(&observation.url)
                    .await?
                    .ok_or_else(|| PersistenceError::new(operation(), err))?;
                Ok((existing, false))
            }
            Err(err) => Err(PersistenceError::new(operation(), err)),
        }
    }

    /// Copies price, currency and availability from the observation when any differ.
    ///
    /// Returns the stored record and whether a write happened. An unchanged
    /// record is returned as is without touching storage.
    pub async fn merge(
        &self,
        stored: product::Model,
        observation: &Observation,
    ) -> Result<(product::Model, bool), PersistenceError> {
        if !stored.needs_merge(observation) {
            return Ok((stored, false));
        }

        let url = stored.url.clone();
        let mut active: product::ActiveModel = stored.into();
        active.price = Set(observation.price);
        active.price_currency = Set(observation.price_currency.clone());
        active.available = Set(observation.available);
        active.updated_at = Set(Utc::now().into());

        let updated = active
            .update(&*self.db)
            .await
            .map_err(PersistenceError::context(format!("merge product {}", url)))?;
        Ok((updated, true))
    }

    /// Bumps `updated_at` so liveness sees the product is still being crawled.
    pub async fn heartbeat(&self, stored: product::Model) -> Result<product::Model, PersistenceError> {
        let url = stored.url.clone();
        let mut active: product::ActiveModel = stored.into();
        active.updated_at = Set(Utc::now().into());
        active
            .update(&*self.db)
            .await
            .map_err(PersistenceError::context(format!("heartbeat product {}", url)))
    }

    pub async fn find_product_by_url(
        &self,
        url: &str,
    ) -> Result<Option<product::Model>, PersistenceError> {
        Product::find()
            .filter(product::Column::Url.eq(url))
            .one(&*self.db)
            .await
            .map_err(PersistenceError::context(format!("find product {}", url)))
    }

    /// Finds a product together with its shop.
    pub async fn find_product(
        &self,
        id: i32,
    ) -> Result<Option<(product::Model, Option<shop::Model>)>, PersistenceError> {
        Product::find_by_id(id)
            .find_also_related(Shop)
            .one(&*self.db)
            .await
            .map_err(PersistenceError::context(format!("find product {}", id)))
    }

    /// Lists products with their shop, optionally filtered on availability.
    pub async fn list_products(
        &self,
        available: Option<bool>,
    ) -> Result<Vec<(product::Model, Option<shop::Model>)>, PersistenceError> {
        let mut query = Product::find().find_also_related(Shop);
        if let Some(available) = available {
            query = query.filter(product::Column::Available.eq(available));
        }
        query
            .order_by_asc(product::Column::Id)
            .all(&*self.db)
            .await
            .map_err(PersistenceError::context("list products"))
    }

    /// Each shop with the `updated_at` of its most recently updated product.
    pub async fn latest_update_per_shop(
        &self,
    ) -> Result<Vec<(shop::Model, Option<DateTimeWithTimeZone>)>, PersistenceError> {
        let shops = self.list_shops().await?;
        let mut result = Vec::with_capacity(shops.len());

        for shop in shops {
            let latest = Product::find()
                .filter(product::Column::ShopId.eq(shop.id))
                .order_by_desc(product::Column::UpdatedAt)
                .one(&*self.db)
                .await
                .map_err(PersistenceError::context(format!(
                    "find latest product of shop {}",
                    shop.name
                )))?;
            result.push((shop, latest.map(|p| p.updated_at)));
        }

        Ok(result)
    }
}
