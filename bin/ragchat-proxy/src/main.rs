//! ragchat-proxy binary.
//!
//! Reads `RAGCHAT_*` configuration, installs the tracing subscriber, then
//! serves the router until Ctrl-C or SIGTERM, letting in-flight streams
//! finish before exiting.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use ragchat_proxy::{AppState, Config, routes};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env();
    init_tracing(&cfg);

    info!(version = env!("CARGO_PKG_VERSION"), "ragchat-proxy starting");
    if cfg.upstream_url.is_none() {
        warn!("RAGCHAT_UPSTREAM_URL is not set; /chat will answer 503 until it is configured");
    }
    // Limiter state is in-process; several replicas each enforce their own quota.
    info!(
        rate_limit = cfg.rate_limit,
        window_secs = cfg.rate_window.as_secs(),
        max_keys = cfg.rate_max_keys,
        max_body_bytes = cfg.max_body_bytes,
        timeout_secs = cfg.upstream_timeout.as_secs(),
        content_fields = ?cfg.content_fields,
        "proxy configured"
    );

    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("RAGCHAT_BIND '{}' is not a socket address", cfg.bind_address))?;
    let app = routes::build(Arc::new(AppState::from_config(cfg)));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("ragchat-proxy stopped");
    Ok(())
}

/// `RUST_LOG` wins over `RAGCHAT_LOG`; an unusable filter degrades to `info`.
fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|e| {
            eprintln!("WARN: RAGCHAT_LOG='{}' is not a valid filter ({e}); using 'info'", cfg.log_level);
            EnvFilter::new("info")
        });

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if cfg.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            warn!(error = %e, "Ctrl-C handler failed");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler failed");
        }
    }

    info!("shutdown requested; draining connections");
}
