//! Shared value types for the activity ingest domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (severity is a closed set, tags are a
//! de-duplicated set, secrets never print) and participate in the admission
//! pipeline.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ActivityId, AgentId, EventUid, ProjectId, TenantId};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 / ISO-8601 timestamp with an explicit offset,
    /// normalising it to UTC.
    ///
    /// Returns `None` for anything else (dates without a time, missing
    /// offset, out-of-range fields).
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns this timestamp shifted forward by `delta`, saturating at the
    /// largest representable instant.
    pub fn saturating_add(self, delta: Duration) -> Self {
        chrono::Duration::from_std(delta)
            .ok()
            .and_then(|d| self.0.checked_add_signed(d))
            .map_or(Self(DateTime::<Utc>::MAX_UTC), Self)
    }

    /// Returns how much later `self` is than `earlier`, or zero if it is not.
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a reported activity event. Closed set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Routine progress; the default when the caller omits `severity`.
    #[default]
    Info,
    /// A task completed successfully.
    Success,
    /// Something degraded but the agent carried on.
    Warning,
    /// The agent failed at something.
    Error,
    /// The agent is blocked on a human.
    NeedsAttention,
}

impl Severity {
    /// All accepted wire values, in declaration order.
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Success,
        Severity::Warning,
        Severity::Error,
        Severity::NeedsAttention,
    ];

    /// Returns the wire name of this severity.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::NeedsAttention => "needs_attention",
        }
    }

    /// Parses a wire name. Matching is exact (case-sensitive).
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// The opaque bearer credential an agent presents on every request.
///
/// Compared by exact equality, never hashed. `Debug` is redacted so keys do
/// not leak into logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngestKey(String);

impl IngestKey {
    /// Wraps a raw key, returning `None` if it is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the raw key for an indexed store lookup.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IngestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IngestKey(<redacted>)")
    }
}

/// Shared secret used to sign request bodies with HMAC-SHA256.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// Wraps a raw secret, returning `None` if it is empty.
    ///
    /// An empty secret means "no signing configured" for the agent.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the key bytes for MAC computation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// A set of labels attached to an activity event.
///
/// Ordering is not significant; the set iterates in sorted order so stored
/// records are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    /// Returns an empty tag set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if `tag` is in the set.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// Agent credential
// ---------------------------------------------------------------------------

/// Everything the admission pipeline needs to know about an agent.
///
/// Owned by the administrative subsystem and loaded fresh on every request;
/// this crate never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCredential {
    /// The agent's identity.
    pub agent_id: AgentId,
    /// Tenant the agent reports into.
    pub tenant_id: TenantId,
    /// Project the agent reports into, if scoped to one.
    pub project_id: Option<ProjectId>,
    /// Secret used to verify request signatures. `None` disables
    /// verification for this agent.
    pub signing_secret: Option<SigningSecret>,
    /// Paused agents are rejected before any rate accounting.
    pub paused: bool,
    /// Labels merged into every event this agent reports.
    pub default_tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A request body that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityPayload {
    /// Idempotency key.
    pub event_uid: EventUid,
    /// Free-form event type such as `"deploy.finished"`.
    pub event_type: String,
    /// Severity; defaults to [`Severity::Info`].
    pub severity: Severity,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Optional open key/value detail map.
    pub details: Option<Map<String, Value>>,
    /// Optional open key/value metadata map.
    pub metadata: Option<Map<String, Value>>,
    /// Optional reference to an issue-tracker ticket.
    pub ticket_id: Option<String>,
    /// Labels supplied by the event itself; `None` when omitted or null.
    pub tags: Option<Vec<String>>,
    /// When the event happened, according to the agent.
    pub occurred_at: Timestamp,
}

/// An activity event ready to be appended by the Persistence Gateway.
///
/// Immutable once inserted. The pair (`agent_id`, `event_uid`) is unique
/// across all records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    /// Tenant of the reporting agent.
    pub tenant_id: TenantId,
    /// Project of the reporting agent, if it has one.
    pub project_id: Option<ProjectId>,
    /// The reporting agent.
    pub agent_id: AgentId,
    /// Caller-chosen idempotency key, unique per agent.
    pub event_uid: EventUid,
    /// Free-form event kind, e.g. `deploy.finished`.
    pub event_type: String,
    /// Defaults to `info` when the agent omits it.
    pub severity: Severity,
    /// Short human-readable summary.
    pub message: Option<String>,
    /// Structured payload shown with the event.
    pub details: Option<Map<String, Value>>,
    /// Opaque caller metadata.
    pub metadata: Option<Map<String, Value>>,
    /// Issue tracker reference, stored as supplied.
    pub ticket_id: Option<String>,
    /// Event tags merged with the agent's defaults.
    pub tags: TagSet,
    /// When the agent says the event happened.
    pub occurred_at: Timestamp,
    /// When the record was accepted.
    pub created_at: Timestamp,
}

/// A durable activity record as read back from the Persistence Gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Store-assigned id.
    pub id: ActivityId,
    /// The event as accepted.
    #[serde(flatten)]
    pub event: NewActivity,
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// The transport-neutral view of one inbound ingest request.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Raw `Authorization` header value, if present.
    pub authorization: Option<String>,
    /// Signature taken from the first present signature header.
    pub signature: Option<String>,
    /// Exact request body bytes; signatures are computed over these.
    pub body: Vec<u8>,
}

/// Successful outcome of an ingest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Id of the durable record (new or pre-existing).
    pub activity_id: ActivityId,
    /// `true` when the event had already been recorded.
    pub idempotent: bool,
}
