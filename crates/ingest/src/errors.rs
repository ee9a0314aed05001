//! Error taxonomy and retry-policy types for the ingest domain.
//!
//! [`IngestError`] is the terminal outcome of a rejected request: the first
//! failing gate of the admission pipeline produces exactly one variant, and
//! the variant alone decides the response status. [`StoreError`] is what the
//! Persistence Gateway reports; the orchestrator folds it into
//! [`IngestError`] without leaking its detail to callers.
//!
//! [`RetryPolicy`] is a cross-cutting concern: it tells the caller whether
//! resubmitting the same request can succeed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AgentId, EventUid};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// ## Rules
///
/// - `Retryable` errors: throughput ceiling reached, store failure on the
///   insert path (the idempotency guard makes resubmission safe).
/// - `NonRetryable` errors: everything that depends on the request or the
///   agent's standing rather than on timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// Retrying the identical request will fail the same way.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Validation detail
// ---------------------------------------------------------------------------

/// One schema violation in a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending body field (`"body"` when the document itself
    /// is not a JSON object).
    pub field: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl FieldError {
    /// Creates a field-level error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request-level errors
// ---------------------------------------------------------------------------

/// Every way an ingest request can be rejected.
///
/// Variants are listed in pipeline order; see [`IngestError::http_status`]
/// for the response mapping.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Ingestion is switched off by configuration.
    #[error("activity ingestion is disabled")]
    ServiceDisabled,

    /// The bearer header is missing or malformed, or the key is unknown.
    #[error("authentication failed: {reason}")]
    Authentication {
        /// Which authentication step failed. Safe to return to callers.
        reason: &'static str,
    },

    /// The agent is paused.
    #[error("agent {agent_id} is paused")]
    Authorization {
        /// The paused agent.
        agent_id: AgentId,
    },

    /// The agent exceeded its per-window ceiling.
    #[error("rate limit exceeded for agent {agent_id}")]
    RateLimited {
        /// The throttled agent.
        agent_id: AgentId,
        /// Time until the agent's current window closes.
        retry_after: Option<Duration>,
    },

    /// The signature header is missing or does not match the body.
    #[error("integrity check failed: {reason}")]
    Integrity {
        /// Which integrity step failed. Safe to return to callers.
        reason: &'static str,
    },

    /// The body failed schema validation.
    #[error("invalid request body ({} field error(s))", .details.len())]
    Validation {
        /// One entry per offending field.
        details: Vec<FieldError>,
    },

    /// The store failed on the critical path.
    ///
    /// The message is for logs only; callers see a generic error.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Anything not covered above.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl IngestError {
    /// Returns the HTTP status code for this error.
    ///
    /// - ServiceDisabled: 503
    /// - Authentication / Integrity: 401
    /// - Authorization: 403
    /// - RateLimited: 429
    /// - Validation: 400
    /// - Persistence / Unknown: 500
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ServiceDisabled => 503,
            Self::Authentication { .. } | Self::Integrity { .. } => 401,
            Self::Authorization { .. } => 403,
            Self::RateLimited { .. } => 429,
            Self::Validation { .. } => 400,
            Self::Persistence(_) | Self::Unknown(_) => 500,
        }
    }

    /// Message returned to the caller. Never includes internal detail.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::ServiceDisabled => "Bot ingest is currently disabled",
            Self::Authentication { reason } | Self::Integrity { reason } => *reason,
            Self::Authorization { .. } => "Bot is paused",
            Self::RateLimited { .. } => "Rate limit exceeded",
            Self::Validation { .. } => "Invalid request body",
            Self::Persistence(_) => "Failed to record activity",
            Self::Unknown(_) => "Internal server error",
        }
    }

    /// Whether the caller may resubmit the same request.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::RateLimited { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Persistence(_) => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Failures reported by a Persistence Gateway or credential directory.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record for (agent, event_uid) already exists. The uniqueness
    /// constraint is the authoritative idempotency backstop.
    #[error("activity {event_uid} already recorded for agent {agent_id}")]
    Conflict {
        /// Agent of the conflicting record.
        agent_id: AgentId,
        /// Idempotency key of the conflicting record.
        event_uid: EventUid,
    },

    /// A stored row did not have the expected shape.
    #[error("failed to decode {entity} row: {message}")]
    Decode {
        /// Kind of row (`"agent"`, `"activity"`).
        entity: &'static str,
        /// Decoder message.
        message: String,
    },

    /// The store could not be reached or rejected the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// The ingest configuration is invalid.
///
/// Produced at load time; the service never starts with an invalid config.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Configuration error: {key}: {message}")]
pub struct ConfigError {
    /// Configuration key that failed to parse.
    pub key: String,
    /// Description of the problem.
    pub message: String,
}
