use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use api_shield::adapters::http::{router, AppState};
use api_shield::adapters::rate_limiter::RateLimitRuntime;
use api_shield::application::RateLimiter;
use api_shield::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config);

    info!("Starting API Shield");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let policies = config
        .rate_limit
        .build_table()
        .context("Invalid rate limit policies")?;
    info!(routes = policies.len(), "Loaded rate limit policies");

    let runtime = RateLimitRuntime::init(&config.rate_limit, config.redis.as_ref())
        .await
        .context("Failed to initialize counter stores")?;

    let selector = runtime.selector().clone();
    let limiter = Arc::new(RateLimiter::new(
        policies,
        Arc::new(selector.clone()),
        runtime.clock(),
    ));
    let app = router(
        AppState::new(limiter, selector),
        config.server.request_timeout(),
    );

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    runtime.shutdown().await;
    served.context("Server error")?;

    info!("API Shield stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
