//! Visit-logging HTTP service.
//!
//! Records page visits to an append-only tab-separated log and exposes a
//! small JSON API over it. See the `visitlog-store` crate for the log format.

pub mod config;
pub mod http;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::http::{build_router, AppState};
use visitlog_store::{VisitLog, LOG_FILE_NAME};

/// Initialize the store and serve the API until the process is stopped.
///
/// Store initialization happens before the listener binds; a failure there
/// propagates out and the process exits without serving anything.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let log_path = config.data_dir.join(LOG_FILE_NAME);
    let store = VisitLog::open(&log_path)
        .with_context(|| format!("Failed to initialize visit log at {}", log_path.display()))?;
    tracing::info!("Visit log ready at {}", store.path().display());

    let assets_dir = config.assets_dir.is_dir().then_some(config.assets_dir.as_path());
    if assets_dir.is_none() {
        tracing::debug!(
            "Assets directory {} not found; serving API only",
            config.assets_dir.display()
        );
    }

    let router = build_router(AppState::new(store), assets_dir);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind visit logger to {addr}"))?;

    tracing::info!("Visit logger listening on http://{addr}");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server encountered an unrecoverable error")?;

    Ok(())
}
