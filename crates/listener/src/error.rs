//! HTTP mapping of the ingest error taxonomy.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ingest::{FieldError, IngestError, RetryPolicy};
use serde::Serialize;

/// An [`IngestError`] on its way to the caller.
#[derive(Debug)]
pub struct ApiError(pub IngestError);

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [FieldError]>,
}

impl ApiError {
    /// The response status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Only the public message leaves the process; store detail stays in the logs.
        let status = self.status_code();
        let details = match &self.0 {
            IngestError::Validation { details } => Some(details.as_slice()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.public_message(),
            details,
        };
        let mut response = (status, Json(body)).into_response();

        if let RetryPolicy::Retryable { after: Some(after) } = self.0.retry_policy() {
            let secs = after.as_secs() + u64::from(after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }

        response
    }
}
