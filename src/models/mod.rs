//! # Data Models
//!
//! SeaORM entities for the catalog and notification threads, plus the raw
//! observation type sources produce.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod notification_thread;
pub mod observation;
pub mod product;
pub mod shop;

pub use notification_thread::Entity as NotificationThread;
pub use observation::Observation;
pub use product::Entity as Product;
pub use shop::Entity as Shop;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "restock".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
