//! # StoreHub Host
//!
//! Runs the provider hub behind an HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! # Optional settings
//! export SANDBOX_CATALOG=config/products.toml
//! export IAP_INIT_TIMEOUT_SECS=10
//!
//! # Run the server
//! iap-host
//! ```

use iap_api::{routes, state::AppState};
use iap_core::{spawn_event_dispatcher, LoggingEventHandler, StatusUpdate, Subscription};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    print_banner();

    let state = AppState::new()?;
    let hub = state.hub.clone();

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Providers registered: {:?}", hub.registry().provider_ids());

    // Subscribe before initializing so the first status updates are logged
    let status_logger = spawn_status_logger(hub.status_updates());
    let event_logger = spawn_event_dispatcher(Arc::new(LoggingEventHandler), hub.events());

    for (provider, reached) in hub.initialize_all().await {
        info!(provider = %provider, state = %reached, "Provider initialized");
    }

    let app = routes::create_router(state);

    info!("StoreHub starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Providers: GET http://{}/api/v1/providers", addr);
        info!("Purchase: POST http://{}/api/v1/purchases", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down providers");
    hub.shutdown().await;
    status_logger.abort();
    event_logger.abort();

    Ok(())
}

fn spawn_status_logger(mut updates: Subscription<StatusUpdate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            info!(
                provider = %update.provider_id,
                state = %update.state,
                available = update.status.available,
                user_authorized = update.status.user_authorized,
                "Provider status"
            );
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_banner() {
    println!(
        r#"
  StoreHub RS
  ━━━━━━━━━━━━━━━━━━━━━━━
  In-app purchase provider hub
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
