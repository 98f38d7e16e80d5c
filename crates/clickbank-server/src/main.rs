//! ClickBank Gateway HTTP Server
//!
//! Axum-based server receiving ClickBank return notifications and sending
//! buyers to the ClickBank order form.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clickbank_payments::{BindingStore, FileBindingStore, GatewayConfig, MemoryBindingStore};

use crate::handlers::{
    checkout, clickbank_notify, get_binding, health_check, list_bindings, put_binding, receipt,
};
use crate::state::AppState;

/// Routing table
pub(crate) fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // ClickBank return and forward legs
        .route("/clickbank/notify", get(clickbank_notify))
        .route("/checkout/{product_id}", get(checkout))
        .route("/api/receipts/{payment_key}", get(receipt))

        // Admin
        .route("/api/bindings", get(list_bindings))
        .route(
            "/api/products/{product_id}/clickbank-item",
            get(get_binding).put(put_binding),
        )

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env()?;

    if config.is_active() {
        tracing::info!(account = %config.account_nickname, "✓ ClickBank configured");
    } else {
        tracing::warn!("⚠ ClickBank not fully configured - checkout redirects disabled");
        tracing::warn!("  Set CLICKBANK_ACCOUNT_NICKNAME and CLICKBANK_SECRET_KEY in .env");
    }
    if config.admin_token.is_none() {
        tracing::warn!("⚠ CLICKBANK_ADMIN_TOKEN not set - binding API disabled");
    }

    let bindings: Arc<dyn BindingStore> = match &config.bindings_path {
        Some(path) => {
            let store = FileBindingStore::open(path)?;
            tracing::info!(path = %store.path().display(), "Using file binding store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("CLICKBANK_BINDINGS_PATH not set - bindings kept in memory");
            Arc::new(MemoryBindingStore::new())
        }
    };

    let state = AppState::new(config, bindings);
    let app = app(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("ClickBank gateway running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                                 - Health check");
    tracing::info!("  GET  /clickbank/notify                       - ClickBank return leg");
    tracing::info!("  GET  /checkout/{{product_id}}                  - Redirect to ClickBank");
    tracing::info!("  GET  /api/receipts/{{payment_key}}             - Order receipt");
    tracing::info!("  GET  /api/bindings                           - List bindings (admin)");
    tracing::info!("  PUT  /api/products/{{product_id}}/clickbank-item - Set binding (admin)");

    axum::serve(listener, app).await?;

    Ok(())
}
