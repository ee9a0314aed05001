//! Agent seeding from a JSON document.
//!
//! The document is an array of [`AgentRow`] objects:
//!
//! ```json
//! [
//!   {
//!     "id": "jabari",
//!     "tenant_id": "demo-org",
//!     "project_id": "demo-project",
//!     "ingest_key": "ik_demo_jabari",
//!     "signing_secret": "change-me",
//!     "paused": false,
//!     "default_tags": ["env:demo"]
//!   }
//! ]
//! ```

use std::path::Path;

use crate::memory::{InMemoryStore, RegisterError};
use crate::rows::AgentRow;

/// Errors raised while loading a seed document.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read seed file {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not an array of agent rows.
    #[error("seed document is not a valid agent list: {0}")]
    Format(#[from] serde_json::Error),

    /// An agent could not be registered.
    #[error("agent {index} in seed document rejected: {source}")]
    Agent {
        /// Position in the array.
        index: usize,
        /// Why registration failed.
        #[source]
        source: RegisterError,
    },
}

/// Registers every agent in `document`, returning how many were loaded.
///
/// # Errors
///
/// Stops at the first malformed document or rejected agent.
pub fn load_agents(store: &InMemoryStore, document: &str) -> Result<usize, SeedError> {
    let rows: Vec<AgentRow> = serde_json::from_str(document)?;
    let count = rows.len();
    for (index, row) in rows.into_iter().enumerate() {
        store
            .register_agent(row)
            .map_err(|source| SeedError::Agent { index, source })?;
    }
    tracing::info!(agents = count, "seeded agent credentials");
    Ok(count)
}

/// Reads `path` and registers the agents it lists.
///
/// # Errors
///
/// See [`load_agents`]; additionally [`SeedError::Io`] if the file cannot
/// be read.
pub fn load_agents_file(store: &InMemoryStore, path: &Path) -> Result<usize, SeedError> {
    let document = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_agents(store, &document)
}

#[cfg(test)]
mod tests {
    use ingest::{CredentialDirectory, IngestKey};

    use super::*;

    #[tokio::test]
    async fn seed_document_registers_agents() {
        let store = InMemoryStore::new();
        let loaded = load_agents(
            &store,
            r#"[
                {"id": "a", "tenant_id": "t", "ingest_key": "ik_a", "default_tags": ["x"]},
                {"id": "b", "tenant_id": "t", "ingest_key": "ik_b", "paused": true}
            ]"#,
        )
        .unwrap();
        assert_eq!(loaded, 2);

        let b = store
            .find_by_ingest_key(&IngestKey::new("ik_b").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(b.paused);
    }

    #[test]
    fn bad_entries_report_their_position() {
        let store = InMemoryStore::new();
        let err = load_agents(
            &store,
            r#"[
                {"id": "a", "tenant_id": "t", "ingest_key": "ik_a"},
                {"id": "b", "tenant_id": "t", "ingest_key": ""}
            ]"#,
        )
        .unwrap_err();
        assert!(matches!(err, SeedError::Agent { index: 1, .. }));

        assert!(matches!(
            load_agents(&store, "{}"),
            Err(SeedError::Format(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let store = InMemoryStore::new();
        let err = load_agents_file(&store, Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, SeedError::Io { .. }));
    }
}
