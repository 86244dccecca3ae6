//! course-checkout HTTP Server
//!
//! Axum-based server for the single-product sales site. Exposes the
//! registration/status endpoint the browser polls and the webhook endpoint
//! the payment provider calls, reconciling the two through an in-memory
//! purchase store.

mod handlers;
mod state;

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::{LogNotifier, MemoryPurchaseStore};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let webhook_secret = std::env::var("WEBHOOK_SECRET").ok();
    if webhook_secret.is_some() {
        tracing::info!("✓ Webhook secret configured");
    } else {
        tracing::warn!("⚠ WEBHOOK_SECRET not set - incoming webhooks will be rejected");
        tracing::warn!("  Set WEBHOOK_SECRET in .env to the provider's signing secret");
    }

    // Build application state
    let state = AppState {
        store: Arc::new(MemoryPurchaseStore::new()),
        notifier: Arc::new(LogNotifier),
        webhook_secret,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router: API routes plus the static landing page
    let app = handlers::router(state)
        .fallback_service(tower_http::services::ServeDir::new("static"))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("course-checkout server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                    - Health check");
    tracing::info!("  POST /api/check-payment-status  - Register intent / poll status");
    tracing::info!("  POST /api/webhook               - Payment provider webhook");

    axum::serve(listener, app).await?;

    Ok(())
}
