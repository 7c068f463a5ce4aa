//! Slotpulse API Server
//!
//! Serves the checkout initiation endpoint and the Stripe webhook
//! ingestion endpoint that activates pro subscriptions.

mod config;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use slotpulse_shared::{create_pool, run_migrations};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::Config, routes::create_router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,slotpulse_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Slotpulse API Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Run migrations
    run_migrations(&pool).await?;

    // Build application state; fails fast on missing Stripe credentials
    let state = AppState::new(pool, config.clone())?;

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        // The checkout initiator is called from the browser
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
