//! # Server Configuration
//!
//! Router and listener for the read-only catalog API.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/shops", get(handlers::shops::list_shops))
        .route("/shops/{id}", get(handlers::shops::get_shop))
        .route("/products", get(handlers::products::list_products))
        .route("/products/{id}", get(handlers::products::get_product))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until `shutdown` is cancelled
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = state
        .config
        .bind_addr()
        .context("Invalid server address")?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, %profile, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::shops::list_shops,
        crate::handlers::shops::get_shop,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::types::ShopInfo,
            crate::handlers::types::ShopsResponse,
            crate::handlers::types::ProductInfo,
            crate::handlers::types::ProductsResponse,
        )
    ),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "shops", description = "Crawled shops"),
        (name = "products", description = "Tracked products and their availability")
    ),
    info(
        title = "Restock API",
        description = "Read-only view of the restock crawler catalog",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
