//! # Request Handlers
//!
//! Axum request handlers exposing the store hub over HTTP.
//! Purchases are asynchronous: `POST /api/v1/purchases` only starts one, and
//! the outcome arrives as a purchase event.

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use iap_core::{
    FanOut, IapError, LifecycleState, Product, ProductQuery, ProductType, ProviderDescriptor,
    ProviderRecord, ProviderStatus, PurchaseEvent, PurchaseQuery,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, instrument};

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Provider as reported by the API
#[derive(Debug, Serialize)]
pub struct ProviderView {
    #[serde(flatten)]
    pub descriptor: ProviderDescriptor,
    pub state: LifecycleState,
    pub status: ProviderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<&ProviderRecord> for ProviderView {
    fn from(record: &ProviderRecord) -> Self {
        Self {
            descriptor: record.descriptor().clone(),
            state: record.state(),
            status: record.latest_status(),
            last_error: record.last_error(),
        }
    }
}

/// Lifecycle transition result
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub provider_id: String,
    pub state: LifecycleState,
}

/// Product query parameters
#[derive(Debug, Deserialize)]
pub struct ProductsParams {
    /// Comma-separated store product ids
    #[serde(default)]
    pub ids: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub product_type: Option<ProductType>,
}

impl ProductsParams {
    fn product_ids(&self) -> BTreeSet<String> {
        self.ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Start-purchase request
#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub product_id: String,
    pub provider_id: String,
    #[serde(default)]
    pub offer_id: Option<String>,
}

/// Start-purchase response
#[derive(Debug, Serialize)]
pub struct BuyResponse {
    pub provider_id: String,
    pub product_id: String,
    pub status: &'static str,
}

/// Restore parameters
#[derive(Debug, Default, Deserialize)]
pub struct RestoreParams {
    #[serde(default)]
    pub provider_id: Option<String>,
}

/// A provider that failed during a fan-out call
#[derive(Debug, Serialize)]
pub struct FailureView {
    pub provider_id: String,
    pub error: String,
    pub code: u16,
}

/// Partial-success response body
#[derive(Debug, Serialize)]
pub struct FanOutResponse<T> {
    pub items: Vec<T>,
    pub failures: Vec<FailureView>,
}

impl<T> From<FanOut<T>> for FanOutResponse<T> {
    fn from(result: FanOut<T>) -> Self {
        Self {
            items: result.items,
            failures: result
                .failures
                .into_iter()
                .map(|f| FailureView {
                    provider_id: f.provider_id,
                    code: f.error.status_code(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn iap_error_to_response(err: IapError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.to_string(), code);
    if err.is_retryable() {
        response = response.with_details("retryable");
    }
    (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(response))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.hub.registry();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storehub",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": registry.len(),
        "ready": registry.ready_providers(None).len(),
    }))
}

/// List registered providers in routing order
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderView>> {
    let providers = state
        .hub
        .registry()
        .providers()
        .iter()
        .map(|record| ProviderView::from(record.as_ref()))
        .collect();
    Json(providers)
}

/// Get one provider
pub async fn get_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> ApiResult<Json<ProviderView>> {
    let record = state
        .hub
        .registry()
        .resolve(&provider_id)
        .map_err(iap_error_to_response)?;
    Ok(Json(ProviderView::from(record.as_ref())))
}

/// Initialize (or retry) one provider
#[instrument(skip(state))]
pub async fn initialize_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> ApiResult<Json<LifecycleResponse>> {
    let reached = state
        .hub
        .lifecycle()
        .initialize(&provider_id)
        .await
        .map_err(iap_error_to_response)?;

    info!(provider = %provider_id, state = %reached, "Initialize requested");
    Ok(Json(LifecycleResponse {
        provider_id,
        state: reached,
    }))
}

/// Dispose one provider
#[instrument(skip(state))]
pub async fn dispose_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> ApiResult<Json<LifecycleResponse>> {
    state
        .hub
        .lifecycle()
        .dispose(&provider_id)
        .await
        .map_err(iap_error_to_response)?;

    Ok(Json(LifecycleResponse {
        provider_id,
        state: LifecycleState::Disposed,
    }))
}

/// Look up products across providers
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductsParams>,
) -> ApiResult<Json<FanOutResponse<Product>>> {
    let query = ProductQuery {
        provider_id: params.provider_id.clone(),
        product_type: params.product_type,
    };

    let result = state
        .hub
        .router()
        .query_products(&params.product_ids(), &query)
        .await
        .map_err(iap_error_to_response)?;

    Ok(Json(result.into()))
}

/// Start a purchase
#[instrument(skip(state, request), fields(product = %request.product_id, provider = %request.provider_id))]
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(request): Json<BuyRequest>,
) -> ApiResult<(StatusCode, Json<BuyResponse>)> {
    state
        .hub
        .router()
        .buy(&request.product_id, &request.provider_id, request.offer_id.as_deref())
        .await
        .map_err(iap_error_to_response)?;

    info!("Purchase started");
    Ok((
        StatusCode::ACCEPTED,
        Json(BuyResponse {
            provider_id: request.provider_id,
            product_id: request.product_id,
            status: "started",
        }),
    ))
}

/// Known purchases
#[instrument(skip(state))]
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<PurchaseQuery>,
) -> ApiResult<Json<FanOutResponse<PurchaseEvent>>> {
    let result = state
        .hub
        .router()
        .get_purchases(&query)
        .await
        .map_err(iap_error_to_response)?;

    Ok(Json(result.into()))
}

/// Restore purchases; results arrive as purchase events
#[instrument(skip(state))]
pub async fn restore_purchases(
    State(state): State<AppState>,
    Query(params): Query<RestoreParams>,
) -> ApiResult<(StatusCode, Json<FanOutResponse<String>>)> {
    let result = state
        .hub
        .router()
        .restore(params.provider_id.as_deref())
        .await
        .map_err(iap_error_to_response)?;

    Ok((StatusCode::ACCEPTED, Json(result.into())))
}
