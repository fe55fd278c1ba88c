//! Database migrations for the restock crawler.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_10_01_000001_create_shops;
mod m2026_10_01_000002_create_products;
mod m2026_10_01_000003_create_notification_threads;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_10_01_000001_create_shops::Migration),
            Box::new(m2026_10_01_000002_create_products::Migration),
            Box::new(m2026_10_01_000003_create_notification_threads::Migration),
        ]
    }
}
