//! Storage adapters for the activity ingest service.
//!
//! Implements [`ingest::CredentialDirectory`] and
//! [`ingest::PersistenceGateway`] over process-local tables. A
//! database-backed deployment replaces this crate; the `ingest` crate does
//! not change.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Row encoding, indexing, and the uniqueness constraint
//! on (agent, event_uid) live here. The [`ingest`] crate sees only the port
//! traits.

pub mod memory;
pub mod rows;
pub mod seed;

pub use memory::{InMemoryStore, RegisterError};
pub use rows::AgentRow;
pub use seed::{load_agents, load_agents_file, SeedError};
