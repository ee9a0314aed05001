//! Credential resolver: bearer token to agent identity.
//!
//! The ingest key is a bearer capability, not a password. It is compared by
//! exact equality through the directory's key index, so resolution costs one
//! indexed lookup regardless of how many agents exist.

use std::sync::Arc;

use crate::ports::CredentialDirectory;
use crate::{AgentCredential, IngestError, IngestKey};

const BEARER_PREFIX: &str = "Bearer ";

/// Extracts the ingest key from an `Authorization` header value.
///
/// # Errors
///
/// [`IngestError::Authentication`] if the header is absent, does not use the
/// `Bearer` scheme, or carries an empty token.
pub fn bearer_token(header: Option<&str>) -> Result<IngestKey, IngestError> {
    header
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .and_then(IngestKey::new)
        .ok_or(IngestError::Authentication {
            reason: "Missing or invalid authorization header",
        })
}

/// Maps ingest keys to agent credentials.
#[derive(Clone)]
pub struct CredentialResolver {
    directory: Arc<dyn CredentialDirectory>,
}

impl CredentialResolver {
    /// Creates a resolver over `directory`.
    pub fn new(directory: Arc<dyn CredentialDirectory>) -> Self {
        Self { directory }
    }

    /// Resolves `key` to the agent it belongs to.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Authentication`] if no agent has this key.
    /// - [`IngestError::Persistence`] if the directory cannot be read.
    pub async fn resolve(&self, key: &IngestKey) -> Result<AgentCredential, IngestError> {
        match self.directory.find_by_ingest_key(key).await {
            Ok(Some(agent)) => Ok(agent),
            Ok(None) => Err(IngestError::Authentication {
                reason: "Invalid ingest key",
            }),
            Err(err) => {
                tracing::error!(error = %err, "credential lookup failed");
                Err(IngestError::Persistence(err.to_string()))
            },
        }
    }
}
