//! # Products API Handlers
//!
//! Products are returned with their shop embedded.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::handlers::types::{ProductInfo, ProductsResponse};
use crate::repositories::CatalogRepository;
use crate::server::AppState;

/// Query parameters for product listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProductsQuery {
    /// Only return products with this availability ("true" or "false")
    pub available: Option<String>,
}

fn parse_available(raw: Option<&str>) -> Result<Option<bool>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<bool>().map(Some).map_err(|_| {
            ApiError::bad_request(format!(
                "invalid value '{}' for available, expected true or false",
                value
            ))
        }),
    }
}

/// List products, optionally filtered on availability
#[utoipa::path(
    get,
    path = "/products",
    params(ListProductsQuery),
    responses(
        (status = 200, description = "List of products", body = ProductsResponse),
        (status = 400, description = "Invalid filter", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ProductsResponse>, ApiError> {
    let available = parse_available(query.available.as_deref())?;

    let repo = CatalogRepository::new(state.db.clone());
    let products = repo.list_products(available).await?;

    Ok(Json(ProductsResponse {
        products: products.into_iter().map(ProductInfo::from).collect(),
    }))
}

/// Fetch a single product
#[utoipa::path(
    get,
    path = "/products/{id}",
    params(("id" = i32, Path, description = "Product identifier")),
    responses(
        (status = 200, description = "Product found", body = ProductInfo),
        (status = 404, description = "Unknown product", body = ApiError)
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProductInfo>, ApiError> {
    let repo = CatalogRepository::new(state.db.clone());
    let product = repo
        .find_product(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("product {} not found", id)))?;

    Ok(Json(product.into()))
}
