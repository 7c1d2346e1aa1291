use std::sync::Arc;

use tollgate::config::Config;
use tollgate::proxy::{EgressGuard, GuardedDialer, HttpForwarder};
use tollgate::router::Router;
use tollgate::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    if cfg.allow_list.is_empty() {
        tracing::warn!("no backend cidr configured, every challenge will be refused");
    }
    tracing::info!(
        ranges = ?cfg.allow_list.ranges().iter().map(|r| r.to_string()).collect::<Vec<_>>(),
        upstream = cfg.upstream.as_deref().unwrap_or("<request host>"),
        dial_policy = ?cfg.dial_policy,
        "egress configured"
    );

    let guard = Arc::new(EgressGuard::new(cfg.allow_list.clone()));
    let dialer = GuardedDialer::new(guard, cfg.dial_policy, cfg.connect_timeout);
    let forwarder = HttpForwarder::new(dialer, cfg.upstream.clone(), cfg.request_timeout);
    let router = Arc::new(Router::new(Arc::new(forwarder)));

    server::listener::run(cfg.listen_addr, router, shutdown_signal()).await?;

    tracing::info!("shutdown signal received");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
