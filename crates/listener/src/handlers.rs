//! Route handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use ingest::{ActivityId, IngestRequest, IngestService, Timestamp, SIGNATURE_HEADERS};
use serde::Serialize;

use crate::error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: IngestService,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub message: &'static str,
    pub activity_id: ActivityId,
    pub idempotent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub db: bool,
    pub last_activity_at: Option<Timestamp>,
    pub version: &'static str,
    pub time: Timestamp,
}

/// `POST /api/ingest/activity`
///
/// The body is taken as raw bytes: the signature covers exactly what the
/// agent sent, so it must be verified before any JSON parsing.
#[tracing::instrument(name = "ingest.activity", skip_all)]
pub async fn ingest_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let request = IngestRequest {
        authorization: header_str(&headers, AUTHORIZATION.as_str()),
        signature: signature_header(&headers),
        body: body.to_vec(),
    };

    match state.service.ingest(request).await {
        Ok(receipt) => {
            let message = if receipt.idempotent {
                "Activity already recorded"
            } else {
                "Activity recorded successfully"
            };
            Ok(Json(IngestResponse {
                success: true,
                message,
                activity_id: receipt.activity_id,
                idempotent: receipt.idempotent,
            }))
        },
        Err(err) => {
            tracing::info!(status = err.http_status(), error = %err, "ingest rejected");
            Err(err.into())
        },
    }
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (db, last_activity_at) = match state.service.store().latest_occurred_at().await {
        Ok(latest) => (true, latest),
        Err(err) => {
            tracing::warn!(error = %err, "health check could not query the store");
            (false, None)
        },
    };

    Json(HealthResponse {
        ok: db,
        db,
        last_activity_at,
        version: env!("CARGO_PKG_VERSION"),
        time: state.service.clock().now(),
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// First non-empty signature header, in [`SIGNATURE_HEADERS`] order.
fn signature_header(headers: &HeaderMap) -> Option<String> {
    SIGNATURE_HEADERS
        .iter()
        .filter_map(|name| header_str(headers, name))
        .find(|value| !value.is_empty())
}
