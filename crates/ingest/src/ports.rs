//! Port traits implemented by infrastructure crates.
//!
//! The admission pipeline only ever talks to storage and time through these
//! traits. `store` provides the in-memory adapters; a database-backed
//! deployment implements the same traits without touching this crate.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    ActivityId, AgentCredential, AgentId, EventUid, IngestKey, NewActivity, StoreError, Timestamp,
};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Read access to agent credentials managed by the administrative subsystem.
#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    /// Finds the agent whose ingest key equals `key` exactly.
    ///
    /// Implementations must answer from an index on the key; this runs on
    /// every request.
    async fn find_by_ingest_key(
        &self,
        key: &IngestKey,
    ) -> Result<Option<AgentCredential>, StoreError>;
}

/// Durable append of activity events.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Returns the id of the record stored for (`agent_id`, `event_uid`), if any.
    async fn find_by_agent_and_event_uid(
        &self,
        agent_id: &AgentId,
        event_uid: &EventUid,
    ) -> Result<Option<ActivityId>, StoreError>;

    /// Appends a new record.
    ///
    /// # Errors
    ///
    /// Must fail with [`StoreError::Conflict`] when a record for the same
    /// (agent, event_uid) already exists.
    async fn insert(&self, event: NewActivity) -> Result<ActivityId, StoreError>;

    /// Records that the agent was last seen at `at`. Best-effort.
    async fn touch_last_activity(&self, agent_id: &AgentId, at: Timestamp)
        -> Result<(), StoreError>;

    /// Most recent `occurred_at` across all stored events.
    async fn latest_occurred_at(&self) -> Result<Option<Timestamp>, StoreError>;
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// The real UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(delta);
    }

    /// Jumps the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
