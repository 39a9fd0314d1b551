//! splitgate server binary
//!
//! Wires the split-test manager into the HTTP surface: auth and rate
//! limiting on the management routes, open visit/conversion recording,
//! Prometheus metrics, and a graceful shutdown that flushes storage.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;

use splitgate::config::ServerConfig;
use splitgate::handlers::{build_protected_routes, build_public_routes};
use splitgate::manager::SplitTestManager;
use splitgate::store::SplitTestStore;
use splitgate::{auth, metrics, middleware};

const STORAGE_FLUSH_TIMEOUT_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Register Prometheus metrics
    metrics::register_metrics().expect("Failed to register metrics");
    info!("Metrics registered at /metrics");

    info!("Starting splitgate server...");

    // Load configuration from environment
    let server_config = ServerConfig::from_env();
    server_config.log();

    info!("Storage path: {:?}", server_config.storage_path);
    let store = SplitTestStore::open(&server_config.storage_path)?;
    let manager = Arc::new(SplitTestManager::new(store));

    // Keep a reference to manager for shutdown cleanup (clone BEFORE moving into router)
    let manager_for_shutdown = Arc::clone(&manager);

    // Configure rate limiting from config
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(server_config.rate_limit_per_second)
        .burst_size(server_config.rate_limit_burst)
        .finish()
        .expect("Failed to build governor rate limiter configuration");

    let governor_layer = GovernorLayer::new(governor_conf);

    info!(
        "Rate limiting enabled: {} req/sec, burst of {}",
        server_config.rate_limit_per_second, server_config.rate_limit_burst
    );

    // Build CORS layer from configuration
    let cors = server_config.cors.to_layer();

    // Protected management routes - require authentication, rate limited
    let protected_routes = build_protected_routes(manager.clone())
        .layer(axum::middleware::from_fn(auth::auth_middleware))
        .layer(governor_layer);

    // Public routes - NO rate limiting (health checks, metrics, visitor traffic)
    // These must always be accessible for monitoring and Kubernetes probes
    let public_routes = build_public_routes(manager.clone());

    let max_concurrent = server_config.max_concurrent_requests;
    info!("Concurrency limiting enabled: max_concurrent={max_concurrent}");

    // Combine public and protected routes; rate limiting applies only to
    // the management surface
    let app = axum::Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(cors);

    // Start server using address from config
    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown signal received, flushing storage...");

    let flush_future = async { manager_for_shutdown.flush() };
    match tokio::time::timeout(
        std::time::Duration::from_secs(STORAGE_FLUSH_TIMEOUT_SECS),
        flush_future,
    )
    .await
    {
        Ok(Ok(())) => info!("Storage flushed successfully"),
        Ok(Err(e)) => tracing::error!("Failed to flush storage: {}", e),
        Err(_) => tracing::error!(
            "Storage flush timed out after {}s",
            STORAGE_FLUSH_TIMEOUT_SECS
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
