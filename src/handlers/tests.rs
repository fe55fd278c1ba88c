//! # Tests for Handlers
//!
//! Drives the router in-process against an in-memory catalog.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::handlers::types::{ProductInfo, ProductsResponse, ShopsResponse};
use crate::models::Observation;
use crate::repositories::CatalogRepository;
use crate::server::{AppState, create_app};

async fn setup_state() -> (AppState, CatalogRepository) {
    let db: DatabaseConnection = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let db = Arc::new(db);
    let state = AppState {
        config: Arc::new(AppConfig::default()),
        db: db.clone(),
    };
    (state, CatalogRepository::new(db))
}

async fn seed(catalog: &CatalogRepository) {
    let shop = catalog.get_or_create_shop("ldlc.com").await.unwrap();
    for (name, url, available) in [
        ("RTX 3080", "https://www.ldlc.com/3080", true),
        ("RTX 3070", "https://www.ldlc.com/3070", false),
    ] {
        let observation = Observation {
            name: name.to_string(),
            url: url.to_string(),
            price: 719.95,
            price_currency: "EUR".to_string(),
            available,
        };
        catalog.upsert_product(&observation, &shop).await.unwrap();
    }
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = create_app(state).oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn root_returns_service_info() {
    let (state, _) = setup_state().await;

    let (status, body) = get(state, "/").await;

    assert_eq!(status, StatusCode::OK);
    let info: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["service"], "restock");
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_reports_ok() {
    let (state, _) = setup_state().await;

    let (status, body) = get(state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn lists_shops_and_products() {
    let (state, catalog) = setup_state().await;
    seed(&catalog).await;

    let (status, body) = get(state.clone(), "/shops").await;
    assert_eq!(status, StatusCode::OK);
    let shops: ShopsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(shops.shops.len(), 1);
    assert_eq!(shops.shops[0].name, "ldlc.com");

    let (status, body) = get(state, "/products").await;
    assert_eq!(status, StatusCode::OK);
    let products: ProductsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(products.products.len(), 2);
    let shop = products.products[0].shop.as_ref().unwrap();
    assert_eq!(shop.name, "ldlc.com");
}

#[tokio::test]
async fn filters_products_on_availability() {
    let (state, catalog) = setup_state().await;
    seed(&catalog).await;

    let (status, body) = get(state.clone(), "/products?available=true").await;
    assert_eq!(status, StatusCode::OK);
    let products: ProductsResponse = serde_json::from_slice(&body).unwrap();
    let names: Vec<_> = products.products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["RTX 3080"]);

    let (status, body) = get(state, "/products?available=maybe").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn fetches_single_product_and_404s_unknown_ids() {
    let (state, catalog) = setup_state().await;
    seed(&catalog).await;
    let stored = catalog
        .find_product_by_url("https://www.ldlc.com/3080")
        .await
        .unwrap()
        .unwrap();

    let (status, body) = get(state.clone(), &format!("/products/{}", stored.id)).await;
    assert_eq!(status, StatusCode::OK);
    let product: ProductInfo = serde_json::from_slice(&body).unwrap();
    assert_eq!(product.url, "https://www.ldlc.com/3080");
    assert!(product.available);

    let (status, body) = get(state.clone(), "/products/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "NOT_FOUND");

    let (status, _) = get(state, "/shops/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn serves_openapi_document() {
    let (state, _) = setup_state().await;

    let (status, body) = get(state, "/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert!(doc["paths"]["/products/{id}"].is_object());
    assert!(doc["paths"]["/shops"].is_object());
}
