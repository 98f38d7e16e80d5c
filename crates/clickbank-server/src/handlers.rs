//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use clickbank_payments::{
    BindingChange, BindingStore, CartStore, Notification, OrderStatus, OrderStore, PaymentError,
    PaymentKey, ProductId,
};

use crate::state::AppState;

/// Cookie identifying the buyer's cart
pub const CART_COOKIE: &str = "cart_session";

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gateway_configured: bool,
    pub bindings: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBindingRequest {
    #[serde(default)]
    pub item: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BindingResponse {
    pub product_id: ProductId,
    pub item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<BindingChange>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub order_id: u64,
    pub status: OrderStatus,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub downloads: Vec<ProductId>,
    pub gateway: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

impl From<PaymentError> for ErrorResponse {
    fn from(e: PaymentError) -> Self {
        Self {
            error: e.user_message().to_string(),
            code: e.code().to_string(),
        }
    }
}

fn payment_error(e: PaymentError) -> ApiError {
    let status = match e {
        PaymentError::ItemAlreadyBound { .. } => StatusCode::CONFLICT,
        PaymentError::InvalidField { .. } => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!("Payment error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(e.into()))
}

fn product_id(raw: u64) -> Result<ProductId, ApiError> {
    if raw == 0 {
        return Err(api_error(StatusCode::NOT_FOUND, "Unknown product", "UNKNOWN_PRODUCT"));
    }
    Ok(ProductId(raw))
}

/// Value of the cart session cookie, if the request carries one
pub fn cart_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(CART_COOKIE)?.strip_prefix('='))
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state.config.admin_token.as_deref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Admin API not configured",
            "ADMIN_DISABLED",
        )
    })?;

    let supplied = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if supplied != Some(expected) {
        tracing::warn!("Rejected admin request with missing or invalid token");
        return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid admin token", "UNAUTHORIZED"));
    }

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        gateway_configured: state.config.is_active(),
        bindings: state.bindings.all().map(|b| b.len()).unwrap_or(0),
    })
}

/// ClickBank return leg.
///
/// Redirects to the success page when a new order was recorded. Every other
/// outcome, including malformed queries, is an empty 200.
pub async fn clickbank_notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<Notification>, QueryRejection>,
) -> Response {
    let notification = query.map(|Query(n)| n).unwrap_or_default();
    let session = cart_session(&headers);

    match state.notifications.handle(&notification, session.as_deref()) {
        Some(redirect) => (
            StatusCode::FOUND,
            [(header::LOCATION, redirect.location)],
        )
            .into_response(),
        None => StatusCode::OK.into_response(),
    }
}

/// ClickBank forward leg: put the product in the cart and send the buyer to
/// the ClickBank order form
pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<u64>,
) -> Result<Response, ApiError> {
    let product = product_id(raw_id)?;

    let url = state
        .checkout
        .purchase_url(product)
        .map_err(payment_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "Product is not available through ClickBank",
                "NOT_AVAILABLE",
            )
        })?;

    let existing = cart_session(&headers);
    let session = existing
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    state
        .carts
        .add_item(&session, product)
        .map_err(payment_error)?;

    let mut response = (StatusCode::FOUND, [(header::LOCATION, url)]).into_response();

    if existing.is_none() {
        let cookie = format!("{CART_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }

    Ok(response)
}

/// List every product binding
pub async fn list_bindings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BTreeMap<ProductId, String>>, ApiError> {
    require_admin(&state, &headers)?;
    state.bindings.all().map(Json).map_err(payment_error)
}

/// Read one product's ClickBank item code
pub async fn get_binding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<u64>,
) -> Result<Json<BindingResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let product = product_id(raw_id)?;

    let item = state.bindings.item_for(product).map_err(payment_error)?;

    Ok(Json(BindingResponse {
        product_id: product,
        item,
        change: None,
    }))
}

/// Set or clear one product's ClickBank item code
pub async fn put_binding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<u64>,
    Json(payload): Json<UpdateBindingRequest>,
) -> Result<Json<BindingResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let product = product_id(raw_id)?;

    let change = state
        .bindings
        .set_item(product, payload.item.as_deref())
        .map_err(|e| {
            if let PaymentError::ItemAlreadyBound { ref item, owner } = e {
                tracing::warn!(item = %item, owner = %owner, product = %product, "Item code already bound");
            }
            payment_error(e)
        })?;

    let item = state.bindings.item_for(product).map_err(payment_error)?;
    tracing::info!(product = %product, item = ?item, change = ?change, "Updated ClickBank binding");

    Ok(Json(BindingResponse {
        product_id: product,
        item,
        change: Some(change),
    }))
}

/// Order receipt for the success page
pub async fn receipt(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let order = state
        .orders
        .get_by_key(&PaymentKey::from_string(key))
        .map_err(payment_error)?
        .filter(|order| order.is_complete())
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Receipt not found", "NOT_FOUND"))?;

    Ok(Json(ReceiptResponse {
        order_id: order.id.0,
        status: order.status,
        email: order.email,
        first_name: order.first_name,
        last_name: order.last_name,
        downloads: order.downloads,
        gateway: order.gateway,
        created_at: order.created_at,
        completed_at: order.completed_at,
    }))
}
