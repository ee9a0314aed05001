//! Activity ingest HTTP surface.
//!
//! Binds an HTTP server and hands every `POST /api/ingest/activity` request
//! to [`ingest::IngestService`]. The handler forwards the raw body bytes so
//! the service can verify the HMAC-SHA256 signature before the body is
//! parsed.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/ingest/activity` | [`handlers::ingest_activity`] |
//! | `GET /api/health` | [`handlers::health`] |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Header extraction, status codes, and JSON response
//! shapes live here. The [`ingest`] crate sees only
//! [`ingest::IngestRequest`] and returns [`ingest::IngestError`].

use std::future::Future;

use axum::routing::{get, post};
use axum::Router;
use ingest::IngestService;
use tokio::net::TcpListener;

pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::AppState;

/// Path of the ingest endpoint.
pub const INGEST_PATH: &str = "/api/ingest/activity";
/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/api/health";

/// Builds the router for `service`.
pub fn router(service: IngestService) -> Router {
    Router::new()
        .route(INGEST_PATH, post(handlers::ingest_activity))
        .route(HEALTH_PATH, get(handlers::health))
        .with_state(AppState { service })
}

/// Serves `service` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve<F>(
    listener: TcpListener,
    service: IngestService,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "ingest listener bound");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
