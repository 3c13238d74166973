use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use unfurl_api::{build_router, config::ServiceConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr(),
        min_browsers = config.pool.min_browsers,
        max_browsers = config.pool.max_browsers,
        max_contexts = config.pool.max_contexts_per_browser,
        rate_limit_enabled = config.rate_limit_enabled,
        "starting unfurl"
    );

    let state = AppState::new(config.clone());

    // A pool that cannot produce a single browser is a startup failure.
    state
        .pool
        .initialize()
        .await
        .context("browser pool initialization failed")?;

    state.limiter.spawn_sweeper();

    let pool = state.pool.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    tracing::info!(addr = %config.bind_addr(), "unfurl listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // In-flight pipelines have finished (bounded by their own deadlines);
    // drain the pool before exiting.
    pool.shutdown().await;
    tracing::info!("unfurl stopped");
    Ok(())
}

/// Resolve on SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
