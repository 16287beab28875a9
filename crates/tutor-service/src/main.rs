//! Tutor Service - HTTP API for the booking, credit and chat engine.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutor_service::{create_router, jobs, AppState, ServiceConfig};
use tutor_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tutor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tutor Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        max_balance = config.max_balance,
        lock_timeout_ms = config.lock_timeout_ms,
        reconcile_enabled = config.reconcile_enabled,
        reconcile_interval_seconds = config.reconcile_interval_seconds,
        api_key_configured = config.service_api_key.is_some(),
        "Service configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open_with(
        &config.data_dir,
        config.engine_options(),
    )?);

    if config.reconcile_enabled {
        jobs::spawn_maintenance(
            Arc::clone(&store),
            Duration::from_secs(config.reconcile_interval_seconds.max(1)),
        );
    } else {
        tracing::warn!("Maintenance job disabled - chat rooms from imports will not be reconciled");
    }

    let state = AppState::new(store, config.clone());
    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
