//! Product entity model
//!
//! This module contains the SeaORM entity model for the products table.
//! The URL is the natural key across every source.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};

use super::observation::Observation;

/// Product tracked by the crawler
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Surrogate identifier (primary key)
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Display name as reported by the source
    pub name: String,

    /// Unique product URL
    #[sea_orm(unique)]
    pub url: String,

    /// Last known price
    pub price: f64,

    /// ISO currency code of `price` (may be empty when unavailable)
    pub price_currency: String,

    /// Last known availability
    pub available: bool,

    /// Owning shop
    pub shop_id: i32,

    /// Timestamp when the product was first seen
    pub created_at: DateTimeWithTimeZone,

    /// Crawl heartbeat, bumped on every successful processing pass
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id"
    )]
    Shop,
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Returns true when price, currency or availability differ from the observation.
    pub fn needs_merge(&self, observation: &Observation) -> bool {
        self.price != observation.price
            || self.price_currency != observation.price_currency
            || self.available != observation.available
    }
}
