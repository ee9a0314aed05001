//! Newtype domain identifiers.
//!
//! Every concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! an [`AgentId`] with a [`TenantId`] even though both are strings under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: owned by the administrative subsystem
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a bot (agent) registered with the event store.
    ///
    /// Resolved from the ingest key on every request; scopes both the rate
    /// window and the idempotency key.
    AgentId
}

string_id! {
    /// Identifies the tenant (organisation) an agent belongs to.
    TenantId
}

string_id! {
    /// Identifies the project an agent reports into, when it has one.
    ProjectId
}

// ---------------------------------------------------------------------------
// Identifiers: supplied by the caller
// ---------------------------------------------------------------------------

string_id! {
    /// The caller-supplied `event_uid` of an activity event.
    ///
    /// Unique per agent across all time; used to detect redelivery.
    EventUid
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (assigned by the store)
// ---------------------------------------------------------------------------

/// Identifies a durable activity record.
///
/// Assigned when the record is inserted and returned to the caller as
/// `activityId`, both for new records and for idempotent replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(Uuid);

impl ActivityId {
    /// Generates a new random record identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an [`ActivityId`] from an existing UUID (e.g. decoded from a row).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_ids_are_rejected() {
        assert!(AgentId::new("").is_none());
        assert!(EventUid::new("").is_none());
        assert_eq!(AgentId::new("bot-1").unwrap().as_str(), "bot-1");
    }

    #[test]
    fn string_ids_serialize_as_plain_strings() {
        let id = TenantId::new("org-7").unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("org-7"));
    }
}
