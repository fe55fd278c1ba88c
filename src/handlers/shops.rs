//! # Shops API Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::error::ApiError;
use crate::handlers::types::{ShopInfo, ShopsResponse};
use crate::repositories::CatalogRepository;
use crate::server::AppState;

/// List every known shop ordered by name
#[utoipa::path(
    get,
    path = "/shops",
    responses(
        (status = 200, description = "List of shops", body = ShopsResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "shops"
)]
pub async fn list_shops(State(state): State<AppState>) -> Result<Json<ShopsResponse>, ApiError> {
    let repo = CatalogRepository::new(state.db.clone());
    let shops = repo.list_shops().await?;

    Ok(Json(ShopsResponse {
        shops: shops.into_iter().map(ShopInfo::from).collect(),
    }))
}

/// Fetch a single shop
#[utoipa::path(
    get,
    path = "/shops/{id}",
    params(("id" = i32, Path, description = "Shop identifier")),
    responses(
        (status = 200, description = "Shop found", body = ShopInfo),
        (status = 404, description = "Unknown shop", body = ApiError)
    ),
    tag = "shops"
)]
pub async fn get_shop(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ShopInfo>, ApiError> {
    let repo = CatalogRepository::new(state.db.clone());
    let shop = repo
        .find_shop(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("shop {} not found", id)))?;

    Ok(Json(shop.into()))
}
