use anyhow::{Context, Result};
use external_backend::api::{create_router, AppState};
use external_backend::config::{self, CONFIG_PATH_ENV};
use external_backend::rate_limit::RateLimiter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "external_backend=info".into()),
        )
        .init();

    info!("External backend starting...");

    let config_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let config = config::load(config_path.as_deref()).context("Failed to load configuration")?;

    info!(
        port = config.server.port,
        rate_limit_enabled = config.rate_limit.enabled,
        config_file = ?config_path,
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new(
        &config.rate_limit,
        info_span!("rate_limiter"),
    ));

    let state = AppState {
        rate_limiter: Arc::clone(&rate_limiter),
    };
    let router = create_router(state, &config.cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped");

    rate_limiter.shutdown();
    rate_limiter.join().await;
    info!("External backend stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
        // No signal handler: serve until killed
        std::future::pending::<()>().await;
    }
}
