//! HTTP surface of the backup daemon.
//!
//! Routes:
//!
//! | Method | Path                          | Auth            |
//! |--------|-------------------------------|-----------------|
//! | GET    | /api/health                   | public          |
//! | GET    | /api/backups                  | superuser       |
//! | POST   | /api/backups                  | superuser       |
//! | POST   | /api/backups/upload           | superuser       |
//! | GET    | /api/backups/{name}?token=    | file token only |
//! | DELETE | /api/backups/{name}           | superuser       |
//! | POST   | /api/backups/{name}/restore   | superuser       |
//! | POST   | /api/files/token              | superuser       |
//! | GET    | /metrics                      | public          |

pub mod audit;
pub mod auth;
mod error;
mod handlers;
pub mod metrics;

pub use error::AppError;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::{FileTokens, SessionTokens};
use crate::daemon::backups::BackupService;

/// Everything the handlers need. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub backups: BackupService,
    pub sessions: SessionTokens,
    pub file_tokens: FileTokens,
    pub metrics: Option<PrometheusHandle>,
}

pub type SharedState = Arc<AppState>;

/// Builds the router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/backups",
            get(handlers::backups_list).post(handlers::backups_create),
        )
        .route(
            "/api/backups/upload",
            post(handlers::backups_upload).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/api/backups/{name}",
            get(handlers::backups_download).delete(handlers::backups_delete),
        )
        .route(
            "/api/backups/{name}/restore",
            post(handlers::backups_restore),
        )
        .route("/api/files/token", post(handlers::files_token))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

/// Serves `state` on `addr` until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: SharedState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Backup API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
