//! Admission gate: operational policy applied to a resolved agent.
//!
//! Two checks, in order: the pause flag, then the throughput ceiling. A
//! paused agent is turned away before rate accounting, so it never consumes
//! its own budget.

use std::sync::Arc;

use crate::rate_limit::{RateLimiter, RateSlot};
use crate::{AgentCredential, AgentId, IngestError};

/// Applies pause and rate policy to resolved agents.
#[derive(Clone)]
pub struct AdmissionGate {
    limiter: Arc<dyn RateLimiter>,
}

impl AdmissionGate {
    /// Creates a gate backed by `limiter`.
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }

    /// Admits the agent or returns the policy that rejected it.
    ///
    /// The returned slot is what [`AdmissionGate::refund`] hands back.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Authorization`] if the agent is paused.
    /// - [`IngestError::RateLimited`] if the agent has used up its window.
    pub fn admit(&self, agent: &AgentCredential) -> Result<RateSlot, IngestError> {
        if agent.paused {
            tracing::info!(agent_id = %agent.agent_id, "rejecting paused agent");
            return Err(IngestError::Authorization {
                agent_id: agent.agent_id.clone(),
            });
        }

        self.limiter
            .allow(&agent.agent_id)
            .ok_or_else(|| IngestError::RateLimited {
                agent_id: agent.agent_id.clone(),
                retry_after: self.limiter.retry_after(&agent.agent_id),
            })
    }

    /// Returns the slot an admitted request consumed.
    pub fn refund(&self, agent_id: &AgentId, slot: RateSlot) {
        self.limiter.refund(agent_id, slot);
    }
}
