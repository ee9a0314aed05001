//! Row shapes held by the in-memory store and their typed decoding.
//!
//! Rows are kept as `serde_json::Value` documents, the way a document store
//! or a loosely typed SQL client hands them back. Every read goes through
//! [`decode`], so a malformed row becomes [`StoreError::Decode`] rather than
//! a wrong assumption about its shape.

use ingest::{
    AgentCredential, AgentId, IngestKey, ProjectId, SigningSecret, StoreError, TenantId, Timestamp,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An agent row as stored by the administrative subsystem.
///
/// Also the format of the agent seed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRow {
    /// Agent id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Project the agent reports into.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Bearer credential, unique across agents.
    pub ingest_key: String,
    /// HMAC key for request signatures.
    #[serde(default)]
    pub signing_secret: Option<String>,
    /// Paused agents are refused with 403.
    #[serde(default)]
    pub paused: bool,
    /// Tags added to every event from this agent.
    #[serde(default)]
    pub default_tags: Option<Vec<String>>,
    /// Last time a new event was accepted.
    #[serde(default)]
    pub last_activity_at: Option<Timestamp>,
}

impl AgentRow {
    /// Converts the row into the credential the admission pipeline reads.
    ///
    /// # Errors
    ///
    /// [`StoreError::Decode`] if a required identifier is empty.
    pub fn into_credential(self) -> Result<AgentCredential, StoreError> {
        let agent_id = AgentId::new(self.id).ok_or_else(|| invalid("agent", "empty id"))?;
        let tenant_id =
            TenantId::new(self.tenant_id).ok_or_else(|| invalid("agent", "empty tenant_id"))?;
        Ok(AgentCredential {
            agent_id,
            tenant_id,
            project_id: self.project_id.and_then(ProjectId::new),
            signing_secret: self.signing_secret.and_then(SigningSecret::new),
            paused: self.paused,
            default_tags: self.default_tags.unwrap_or_default(),
        })
    }

    /// The row's ingest key, if non-empty.
    pub fn key(&self) -> Option<IngestKey> {
        IngestKey::new(self.ingest_key.clone())
    }
}

/// Decodes a stored document into `T`.
///
/// # Errors
///
/// [`StoreError::Decode`] naming `entity` when the document does not match.
pub fn decode<T: DeserializeOwned>(entity: &'static str, row: &Value) -> Result<T, StoreError> {
    T::deserialize(row).map_err(|err| invalid(entity, err.to_string()))
}

/// Encodes `value` into a stored document.
///
/// # Errors
///
/// [`StoreError::Unavailable`] if serialisation fails.
pub fn encode<T: Serialize>(entity: &'static str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value)
        .map_err(|err| StoreError::Unavailable(format!("failed to encode {entity} row: {err}")))
}

fn invalid(entity: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Decode {
        entity,
        message: message.into(),
    }
}
