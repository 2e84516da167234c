//! # Routes
//!
//! Axum router configuration for the store hub API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Providers:
///   - GET  /api/v1/providers - List providers in routing order
///   - GET  /api/v1/providers/{provider_id} - Get provider state and status
///   - POST /api/v1/providers/{provider_id}/initialize - Initialize or retry
///   - POST /api/v1/providers/{provider_id}/dispose - Dispose
///
/// - Catalog and purchases:
///   - GET  /api/v1/products?ids=a,b - Query products
///   - POST /api/v1/purchases - Start a purchase
///   - GET  /api/v1/purchases - Known purchases
///   - POST /api/v1/restore - Restore purchases
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/providers", get(handlers::list_providers))
        .route("/providers/{provider_id}", get(handlers::get_provider))
        .route(
            "/providers/{provider_id}/initialize",
            post(handlers::initialize_provider),
        )
        .route("/providers/{provider_id}/dispose", post(handlers::dispose_provider))
        .route("/products", get(handlers::list_products))
        .route(
            "/purchases",
            get(handlers::list_purchases).post(handlers::create_purchase),
        )
        .route("/restore", post(handlers::restore_purchases));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
