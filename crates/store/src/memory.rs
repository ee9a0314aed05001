//! Process-local implementation of the storage ports.
//!
//! Suitable for development, demos and tests. Agents are indexed by ingest
//! key; activities by id, with a unique index on (agent, event_uid) checked
//! and updated under the same write lock as the row insert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ingest::{
    ActivityId, ActivityRecord, AgentCredential, AgentId, CredentialDirectory, EventUid,
    IngestKey, NewActivity, PersistenceGateway, StoreError, Timestamp,
};
use parking_lot::RwLock;
use serde_json::Value;

use crate::rows::{decode, encode, AgentRow};

/// Errors raised while registering agents.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    /// Another agent already holds this ingest key.
    #[error("ingest key for agent {agent_id} is already assigned to agent {holder}")]
    DuplicateKey {
        /// The agent being registered.
        agent_id: AgentId,
        /// The agent that already holds the key.
        holder: AgentId,
    },

    /// The row is missing a required value.
    #[error(transparent)]
    Invalid(#[from] StoreError),
}

/// In-memory credential directory and Persistence Gateway.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    agents: RwLock<AgentTable>,
    activities: RwLock<ActivityTable>,
}

#[derive(Default)]
struct AgentTable {
    rows: HashMap<AgentId, Value>,
    by_key: HashMap<String, AgentId>,
}

#[derive(Default)]
struct ActivityTable {
    rows: HashMap<ActivityId, Value>,
    by_event: HashMap<(AgentId, EventUid), ActivityId>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an agent.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::DuplicateKey`] if a different agent holds the key.
    /// - [`RegisterError::Invalid`] if the row cannot become a credential.
    pub fn register_agent(&self, row: AgentRow) -> Result<AgentId, RegisterError> {
        let agent_id = row.clone().into_credential()?.agent_id;
        let key = row.key().ok_or_else(|| {
            RegisterError::Invalid(StoreError::Decode {
                entity: "agent",
                message: "empty ingest_key".into(),
            })
        })?;
        let document = encode("agent", &row)?;

        let mut agents = self.inner.agents.write();
        if let Some(holder) = agents.by_key.get(key.expose()) {
            if holder != &agent_id {
                return Err(RegisterError::DuplicateKey {
                    agent_id,
                    holder: holder.clone(),
                });
            }
        }
        agents.by_key.retain(|_, id| id != &agent_id);
        agents.by_key.insert(key.expose().to_owned(), agent_id.clone());
        agents.rows.insert(agent_id.clone(), document);

        tracing::debug!(agent_id = %agent_id, "registered agent");
        Ok(agent_id)
    }

    /// When the agent was last seen, if ever.
    ///
    /// # Errors
    ///
    /// [`StoreError::Decode`] if the agent row is malformed.
    pub fn last_activity_at(&self, agent_id: &AgentId) -> Result<Option<Timestamp>, StoreError> {
        let agents = self.inner.agents.read();
        match agents.rows.get(agent_id) {
            Some(row) => Ok(decode::<AgentRow>("agent", row)?.last_activity_at),
            None => Ok(None),
        }
    }

    /// Reads back one stored activity.
    ///
    /// # Errors
    ///
    /// [`StoreError::Decode`] if the row is malformed.
    pub fn activity(&self, id: ActivityId) -> Result<Option<ActivityRecord>, StoreError> {
        let activities = self.inner.activities.read();
        activities
            .rows
            .get(&id)
            .map(|row| decode("activity", row))
            .transpose()
    }

    /// Number of stored activities.
    pub fn activity_count(&self) -> usize {
        self.inner.activities.read().rows.len()
    }
}

#[async_trait]
impl CredentialDirectory for InMemoryStore {
    async fn find_by_ingest_key(
        &self,
        key: &IngestKey,
    ) -> Result<Option<AgentCredential>, StoreError> {
        let agents = self.inner.agents.read();
        let Some(agent_id) = agents.by_key.get(key.expose()) else {
            return Ok(None);
        };
        let row = agents.rows.get(agent_id).ok_or_else(|| StoreError::Decode {
            entity: "agent",
            message: format!("key index points at missing agent {agent_id}"),
        })?;
        decode::<AgentRow>("agent", row)?.into_credential().map(Some)
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
    async fn find_by_agent_and_event_uid(
        &self,
        agent_id: &AgentId,
        event_uid: &EventUid,
    ) -> Result<Option<ActivityId>, StoreError> {
        let activities = self.inner.activities.read();
        Ok(activities
            .by_event
            .get(&(agent_id.clone(), event_uid.clone()))
            .copied())
    }

    async fn insert(&self, event: NewActivity) -> Result<ActivityId, StoreError> {
        let unique = (event.agent_id.clone(), event.event_uid.clone());
        let record = ActivityRecord {
            id: ActivityId::new_random(),
            event,
        };
        let document = encode("activity", &record)?;

        let mut activities = self.inner.activities.write();
        if activities.by_event.contains_key(&unique) {
            let (agent_id, event_uid) = unique;
            return Err(StoreError::Conflict {
                agent_id,
                event_uid,
            });
        }
        activities.by_event.insert(unique, record.id);
        activities.rows.insert(record.id, document);
        Ok(record.id)
    }

    async fn touch_last_activity(
        &self,
        agent_id: &AgentId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut agents = self.inner.agents.write();
        let Some(row) = agents.rows.get_mut(agent_id) else {
            return Err(StoreError::Unavailable(format!("agent {agent_id} not found")));
        };
        let mut decoded: AgentRow = decode("agent", row)?;
        decoded.last_activity_at = Some(at);
        *row = encode("agent", &decoded)?;
        Ok(())
    }

    async fn latest_occurred_at(&self) -> Result<Option<Timestamp>, StoreError> {
        let activities = self.inner.activities.read();
        let mut latest = None;
        for row in activities.rows.values() {
            let record: ActivityRecord = decode("activity", row)?;
            latest = latest.max(Some(record.event.occurred_at));
        }
        Ok(latest)
    }
}
