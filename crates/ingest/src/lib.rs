//! Activity ingest domain.
//!
//! This crate contains every domain concept, newtype identifier, value type,
//! and error type used by the ingest endpoint, plus the admission pipeline
//! itself. Infrastructure crates implement the port traits defined here; they
//! never add admission rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no network or file
//! I/O. It defines *what* storage and time must provide; `store` and
//! `listener` define *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`AgentId`, `EventUid`, `ActivityId`, etc.) |
//! | [`types`] | Value types (`Severity`, `TagSet`, `AgentCredential`, `Timestamp`, etc.) |
//! | [`errors`] | Error taxonomy and retry policy |
//! | [`config`] | `IngestConfig` and its environment keys |
//! | [`ports`] | Storage and clock traits |
//! | [`resolver`] | Bearer token parsing and credential resolution |
//! | [`admission`] | Pause and rate policy |
//! | [`rate_limit`] | Fixed-window per-agent counter |
//! | [`signature`] | HMAC-SHA256 body verification |
//! | [`validation`] | Request body schema |
//! | [`tags`] | Tag reconciliation |
//! | [`orchestrator`] | `IngestService`, the request lifecycle |

pub mod admission;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod orchestrator;
pub mod ports;
pub mod rate_limit;
pub mod resolver;
pub mod signature;
pub mod tags;
pub mod types;
pub mod validation;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::IngestConfig;
pub use errors::{ConfigError, FieldError, IngestError, RetryPolicy, StoreError};
pub use identifiers::{ActivityId, AgentId, EventUid, ProjectId, TenantId};
pub use orchestrator::IngestService;
pub use ports::{Clock, CredentialDirectory, ManualClock, PersistenceGateway, SystemClock};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitConfig, RateLimiter, RateSlot};
pub use signature::{sign_body, SIGNATURE_HEADERS};
pub use types::{
    ActivityPayload, ActivityRecord, AgentCredential, IngestKey, IngestReceipt, IngestRequest,
    NewActivity, Severity, SigningSecret, TagSet, Timestamp,
};
