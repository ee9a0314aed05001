//! Request orchestrator: one ingest request from receipt to response.
//!
//! Gates run strictly in order and the first failure is terminal:
//!
//! ```text
//! Received → Authenticated → Admitted → Verified → Validated → Deduplicated → Persisted
//! ```
//!
//! The last-activity touch after a successful insert is a best-effort side
//! channel. Its failure is logged and never changes the response. Replays
//! do not touch last-activity at all.

use std::sync::Arc;

use tracing::Instrument;

use crate::admission::AdmissionGate;
use crate::config::IngestConfig;
use crate::ports::{Clock, CredentialDirectory, PersistenceGateway};
use crate::rate_limit::{RateLimiter, RateSlot};
use crate::resolver::{bearer_token, CredentialResolver};
use crate::{
    signature, tags, validation, ActivityId, ActivityPayload, AgentCredential, IngestError,
    IngestReceipt, IngestRequest, NewActivity, StoreError, Timestamp,
};

/// Runs the admission pipeline and persists accepted events.
#[derive(Clone)]
pub struct IngestService {
    config: Arc<IngestConfig>,
    resolver: CredentialResolver,
    gate: AdmissionGate,
    store: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
}

impl IngestService {
    /// Wires the pipeline from its collaborators.
    pub fn new(
        config: IngestConfig,
        directory: Arc<dyn CredentialDirectory>,
        store: Arc<dyn PersistenceGateway>,
        limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver: CredentialResolver::new(directory),
            gate: AdmissionGate::new(limiter),
            store,
            clock,
        }
    }

    /// The configuration this service was built with.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// The Persistence Gateway this service writes to.
    pub fn store(&self) -> &Arc<dyn PersistenceGateway> {
        &self.store
    }

    /// The clock this service stamps records with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Processes one request.
    ///
    /// # Errors
    ///
    /// The [`IngestError`] of the first gate that rejected the request.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, IngestError> {
        if !self.config.ingest_enabled {
            return Err(IngestError::ServiceDisabled);
        }

        let key = bearer_token(request.authorization.as_deref())?;
        let agent = self.resolver.resolve(&key).await?;

        let span = tracing::info_span!("ingest.agent", agent_id = %agent.agent_id);
        self.admit_and_record(agent, request).instrument(span).await
    }

    async fn admit_and_record(
        &self,
        agent: AgentCredential,
        request: IngestRequest,
    ) -> Result<IngestReceipt, IngestError> {
        let slot = self.gate.admit(&agent)?;

        signature::verify_integrity(
            &self.config,
            &agent,
            request.signature.as_deref(),
            &request.body,
        )?;

        let payload = validation::parse_activity(&request.body)?;

        if let Some(existing) = self.find_existing(&agent, &payload).await? {
            return Ok(self.replayed(&agent, &payload, existing, slot));
        }

        let event = self.build_event(&agent, payload);
        let event_uid = event.event_uid.clone();

        match self.store.insert(event).await {
            Ok(activity_id) => {
                tracing::info!(
                    target: "ingest::audit",
                    agent_id = %agent.agent_id,
                    tenant_id = %agent.tenant_id,
                    event_uid = %event_uid,
                    activity_id = %activity_id,
                    "activity recorded"
                );
                self.touch_last_activity(&agent).await;
                Ok(IngestReceipt {
                    activity_id,
                    idempotent: false,
                })
            },
            Err(StoreError::Conflict { .. }) => {
                // Lost a race with a concurrent duplicate; the winner's row is authoritative.
                let existing = self
                    .store
                    .find_by_agent_and_event_uid(&agent.agent_id, &event_uid)
                    .await
                    .map_err(|err| persistence_failure("lookup after conflict", err))?
                    .ok_or_else(|| {
                        IngestError::Unknown(format!(
                            "conflict reported for {event_uid} but no record found"
                        ))
                    })?;
                tracing::info!(
                    event_uid = %event_uid,
                    activity_id = %existing,
                    "duplicate resolved by uniqueness constraint"
                );
                self.gate.refund(&agent.agent_id, slot);
                Ok(IngestReceipt {
                    activity_id: existing,
                    idempotent: true,
                })
            },
            Err(err) => Err(persistence_failure("insert", err)),
        }
    }

    async fn find_existing(
        &self,
        agent: &AgentCredential,
        payload: &ActivityPayload,
    ) -> Result<Option<ActivityId>, IngestError> {
        self.store
            .find_by_agent_and_event_uid(&agent.agent_id, &payload.event_uid)
            .await
            .map_err(|err| persistence_failure("idempotency lookup", err))
    }

    fn replayed(
        &self,
        agent: &AgentCredential,
        payload: &ActivityPayload,
        activity_id: ActivityId,
        slot: RateSlot,
    ) -> IngestReceipt {
        tracing::info!(
            event_uid = %payload.event_uid,
            activity_id = %activity_id,
            "activity already recorded"
        );
        self.gate.refund(&agent.agent_id, slot);
        IngestReceipt {
            activity_id,
            idempotent: true,
        }
    }

    fn build_event(&self, agent: &AgentCredential, payload: ActivityPayload) -> NewActivity {
        let tags = tags::reconcile(payload.tags.as_deref(), Some(agent.default_tags.as_slice()));
        NewActivity {
            tenant_id: agent.tenant_id.clone(),
            project_id: agent.project_id.clone(),
            agent_id: agent.agent_id.clone(),
            event_uid: payload.event_uid,
            event_type: payload.event_type,
            severity: payload.severity,
            message: payload.message,
            details: payload.details,
            metadata: payload.metadata,
            ticket_id: payload.ticket_id,
            tags,
            occurred_at: payload.occurred_at,
            created_at: self.clock.now(),
        }
    }

    async fn touch_last_activity(&self, agent: &AgentCredential) {
        let now: Timestamp = self.clock.now();
        if let Err(err) = self.store.touch_last_activity(&agent.agent_id, now).await {
            tracing::warn!(error = %err, "failed to update last activity; continuing");
        }
    }
}

fn persistence_failure(step: &'static str, err: StoreError) -> IngestError {
    tracing::error!(step, error = %err, "store failure");
    IngestError::Persistence(format!("{step}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::ports::ManualClock;
    use crate::rate_limit::{FixedWindowRateLimiter, RateLimitConfig};
    use crate::{AgentId, EventUid, IngestKey, SigningSecret, TenantId};

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    struct Agents(HashMap<String, AgentCredential>);

    #[async_trait]
    impl CredentialDirectory for Agents {
        async fn find_by_ingest_key(
            &self,
            key: &IngestKey,
        ) -> Result<Option<AgentCredential>, StoreError> {
            Ok(self.0.get(key.expose()).cloned())
        }
    }

    #[derive(Default)]
    struct Events {
        rows: Mutex<Vec<(ActivityId, NewActivity)>>,
        touched: Mutex<Vec<(AgentId, Timestamp)>>,
        fail_insert: AtomicBool,
        fail_touch: AtomicBool,
        hide_from_lookup: AtomicBool,
    }

    impl Events {
        fn count(&self) -> usize {
            self.rows.lock().len()
        }

        fn only_row(&self) -> NewActivity {
            let rows = self.rows.lock();
            assert_eq!(rows.len(), 1);
            rows[0].1.clone()
        }
    }

    #[async_trait]
    impl PersistenceGateway for Events {
        async fn find_by_agent_and_event_uid(
            &self,
            agent_id: &AgentId,
            event_uid: &EventUid,
        ) -> Result<Option<ActivityId>, StoreError> {
            if self.hide_from_lookup.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(self
                .rows
                .lock()
                .iter()
                .find(|(_, e)| &e.agent_id == agent_id && &e.event_uid == event_uid)
                .map(|(id, _)| *id))
        }

        async fn insert(&self, event: NewActivity) -> Result<ActivityId, StoreError> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            let mut rows = self.rows.lock();
            if rows
                .iter()
                .any(|(_, e)| e.agent_id == event.agent_id && e.event_uid == event.event_uid)
            {
                return Err(StoreError::Conflict {
                    agent_id: event.agent_id,
                    event_uid: event.event_uid,
                });
            }
            let id = ActivityId::new_random();
            rows.push((id, event));
            Ok(id)
        }

        async fn touch_last_activity(
            &self,
            agent_id: &AgentId,
            at: Timestamp,
        ) -> Result<(), StoreError> {
            if self.fail_touch.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("timeout".into()));
            }
            self.touched.lock().push((agent_id.clone(), at));
            Ok(())
        }

        async fn latest_occurred_at(&self) -> Result<Option<Timestamp>, StoreError> {
            Ok(self.rows.lock().iter().map(|(_, e)| e.occurred_at).max())
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    const SECRET: &str = "shared-secret";

    struct Harness {
        service: IngestService,
        events: Arc<Events>,
        clock: Arc<ManualClock>,
    }

    fn agent(id: &str, paused: bool, secret: Option<&str>, defaults: &[&str]) -> AgentCredential {
        AgentCredential {
            agent_id: AgentId::new(id).unwrap(),
            tenant_id: TenantId::new("org-1").unwrap(),
            project_id: None,
            signing_secret: secret.and_then(SigningSecret::new),
            paused,
            default_tags: defaults.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn harness(config: IngestConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Timestamp::parse_rfc3339("2024-05-01T09:00:00Z").unwrap(),
        ));
        let agents = Agents(HashMap::from([
            ("ik_x".to_string(), agent("bot-x", false, Some(SECRET), &["env:prod"])),
            ("ik_y".to_string(), agent("bot-y", false, None, &[])),
            ("ik_paused".to_string(), agent("bot-p", true, None, &[])),
        ]));
        let events = Arc::new(Events::default());
        let limiter = Arc::new(FixedWindowRateLimiter::new(
            RateLimitConfig {
                max_requests: config.rate_limit_per_minute,
                window: config.rate_window,
                cleanup_interval: 1_000,
            },
            clock.clone(),
        ));
        let service = IngestService::new(
            config,
            Arc::new(agents),
            events.clone(),
            limiter,
            clock.clone(),
        );
        Harness {
            service,
            events,
            clock,
        }
    }

    fn enabled() -> IngestConfig {
        IngestConfig {
            ingest_enabled: true,
            ..IngestConfig::default()
        }
    }

    fn body(event_uid: &str, tags: &[&str]) -> Vec<u8> {
        serde_json::json!({
            "event_uid": event_uid,
            "event_type": "deploy.finished",
            "tags": tags,
            "occurred_at": "2024-05-01T08:59:00Z"
        })
        .to_string()
        .into_bytes()
    }

    fn request(key: &str, body: Vec<u8>) -> IngestRequest {
        let signature = signature::sign_body(&SigningSecret::new(SECRET).unwrap(), &body);
        IngestRequest {
            authorization: Some(format!("Bearer {key}")),
            signature,
            body,
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn disabled_service_rejects_before_authentication() {
        let h = harness(IngestConfig::default());
        let err = h
            .service
            .ingest(IngestRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ServiceDisabled));
    }

    #[tokio::test]
    async fn new_event_is_stored_with_merged_tags() {
        let h = harness(enabled());
        let receipt = h
            .service
            .ingest(request("ik_x", body("e1", &["urgent", "env:prod"])))
            .await
            .unwrap();
        assert!(!receipt.idempotent);

        let row = h.events.only_row();
        assert_eq!(row.tags.iter().collect::<Vec<_>>(), vec!["env:prod", "urgent"]);
        assert_eq!(row.created_at, h.clock.now());
        assert_eq!(h.events.touched.lock().len(), 1);
    }

    #[tokio::test]
    async fn replay_returns_same_id_without_touching_last_activity() {
        let h = harness(enabled());
        let first = h
            .service
            .ingest(request("ik_x", body("e1", &[])))
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(1));
        let second = h
            .service
            .ingest(request("ik_x", body("e1", &[])))
            .await
            .unwrap();

        assert!(second.idempotent);
        assert_eq!(first.activity_id, second.activity_id);
        assert_eq!(h.events.count(), 1);
        assert_eq!(h.events.touched.lock().len(), 1);
    }

    #[tokio::test]
    async fn same_event_uid_for_two_agents_is_two_records() {
        let h = harness(enabled());
        let a = h.service.ingest(request("ik_x", body("shared", &[]))).await.unwrap();
        let b = h.service.ingest(request("ik_y", body("shared", &[]))).await.unwrap();
        assert!(!a.idempotent && !b.idempotent);
        assert_ne!(a.activity_id, b.activity_id);
        assert_eq!(h.events.count(), 2);
    }

    #[tokio::test]
    async fn lost_insert_race_is_reported_as_replay() {
        let h = harness(enabled());
        let first = h
            .service
            .ingest(request("ik_x", body("e1", &[])))
            .await
            .unwrap();

        h.events.hide_from_lookup.store(true, Ordering::SeqCst);
        let second = h
            .service
            .ingest(request("ik_x", body("e1", &[])))
            .await
            .unwrap();
        assert!(second.idempotent);
        assert_eq!(second.activity_id, first.activity_id);
        assert_eq!(h.events.count(), 1);
    }

    #[tokio::test]
    async fn insert_failure_is_generic_and_retryable() {
        let h = harness(enabled());
        h.events.fail_insert.store(true, Ordering::SeqCst);
        let err = h
            .service
            .ingest(request("ik_x", body("e1", &[])))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.public_message(), "Failed to record activity");

        h.events.fail_insert.store(false, Ordering::SeqCst);
        let retried = h
            .service
            .ingest(request("ik_x", body("e1", &[])))
            .await
            .unwrap();
        assert!(!retried.idempotent);
    }

    #[tokio::test]
    async fn last_activity_failure_does_not_fail_the_request() {
        let h = harness(enabled());
        h.events.fail_touch.store(true, Ordering::SeqCst);
        let receipt = h
            .service
            .ingest(request("ik_x", body("e1", &[])))
            .await
            .unwrap();
        assert!(!receipt.idempotent);
        assert_eq!(h.events.count(), 1);
    }

    #[tokio::test]
    async fn paused_agent_is_forbidden() {
        let h = harness(enabled());
        let err = h
            .service
            .ingest(request("ik_paused", body("e1", &[])))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert_eq!(h.events.count(), 0);
    }

    #[tokio::test]
    async fn gates_run_in_order() {
        let h = harness(IngestConfig {
            require_signature: true,
            ..enabled()
        });

        // Bad signature and bad body: integrity wins.
        let mut req = request("ik_x", b"{}".to_vec());
        req.signature = Some("00".repeat(32));
        let err = h.service.ingest(req).await.unwrap_err();
        assert!(matches!(err, IngestError::Integrity { .. }));

        // Valid signature over an invalid body: validation.
        let err = h
            .service
            .ingest(request("ik_x", b"{}".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation { .. }));

        // Unknown key: authentication before anything else.
        let err = h
            .service
            .ingest(request("ik_nobody", b"{}".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "Invalid ingest key");
    }

    #[tokio::test]
    async fn scenario_with_ceiling_of_two() {
        let h = harness(IngestConfig {
            require_signature: true,
            rate_limit_per_minute: 2,
            ..enabled()
        });

        let e1 = h
            .service
            .ingest(request("ik_x", body("e1", &["urgent"])))
            .await
            .unwrap();
        assert!(!e1.idempotent);

        h.clock.advance(Duration::from_secs(1));
        let replay = h
            .service
            .ingest(request("ik_x", body("e1", &["urgent"])))
            .await
            .unwrap();
        assert!(replay.idempotent);
        assert_eq!(replay.activity_id, e1.activity_id);

        h.clock.advance(Duration::from_secs(1));
        assert!(h.service.ingest(request("ik_x", body("e2", &[]))).await.is_ok());

        h.clock.advance(Duration::from_secs(1));
        let err = h
            .service
            .ingest(request("ik_x", body("e3", &[])))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 429);

        h.clock.advance(Duration::from_secs(58));
        let e3 = h
            .service
            .ingest(request("ik_x", body("e3", &[])))
            .await
            .unwrap();
        assert!(!e3.idempotent);
        assert_eq!(h.events.count(), 3);
    }
}
