//! Token-gated session lifecycle: create, authorize, terminate, reclaim.
//!
//! Every entry point verifies the bearer token before touching the registry.
//! Teardown is funneled through a single rule: whoever removes the record
//! from the registry releases the sandbox, and nobody else does.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dockhand_core::{
    IdentityVerifier, OrchestratorError, SandboxProvider, SessionId, SessionRecord,
};

use crate::registry::SessionRegistry;

/// Sessions idle longer than this are reclaimed.
pub const DEFAULT_IDLE_BUDGET: Duration = Duration::from_secs(30 * 60);

/// Cap on one sandbox release during a sweep so a wedged daemon cannot stall
/// the reclaimer behind it.
const SWEEP_RELEASE_GRACE: Duration = Duration::from_secs(20);

/// Outcome of a terminate. `warning` is set when the session is gone from
/// the registry but the sandbox release did not fully confirm.
#[derive(Debug, Clone, Default)]
pub struct TerminationReport {
    pub warning: Option<String>,
}

/// Owns session lifecycle end to end; shared behind an `Arc` by the HTTP
/// surface, the relay, and the reclaimer.
pub struct SessionManager {
    registry: SessionRegistry,
    verifier: Arc<dyn IdentityVerifier>,
    provider: Arc<dyn SandboxProvider>,
    idle_budget: Duration,
}

impl SessionManager {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            verifier,
            provider,
            idle_budget: DEFAULT_IDLE_BUDGET,
        }
    }

    pub fn with_idle_budget(mut self, budget: Duration) -> Self {
        self.idle_budget = budget;
        self
    }

    /// Provision a sandbox and register a session for the token's owner.
    ///
    /// Provisioning and registration run on their own task: once the sandbox
    /// starts coming up it lands in the registry even if the caller goes
    /// away mid-request, so the sweep can always find it.
    pub async fn create(
        &self,
        token: &str,
        step_id: &str,
    ) -> Result<SessionRecord, OrchestratorError> {
        let identity = self.verifier.verify(token).await?;
        let step_id = step_id.trim();
        if step_id.is_empty() {
            return Err(OrchestratorError::InvalidRequest("step id is required".to_string()));
        }

        // The id is minted before the sandbox exists so the container name
        // can embed it.
        let id = Uuid::new_v4();
        let provider = self.provider.clone();
        let registry = self.registry.clone();
        let step_id = step_id.to_string();
        let task = tokio::spawn(async move {
            let sandbox_id = provider
                .create(&id)
                .await
                .map_err(|e| OrchestratorError::ProvisioningFailed(e.to_string()))?;
            let record = SessionRecord::new(id, identity, step_id, sandbox_id);
            registry.insert(record.clone()).await;
            info!(
                session = %id,
                user = record.owner.user_id,
                step = %record.step_id,
                "session created"
            );
            Ok(record)
        });
        task.await
            .map_err(|e| OrchestratorError::ProvisioningFailed(e.to_string()))?
    }

    /// Verify the token and that its owner holds the session. Absent and
    /// foreign-owned sessions both come back `NotFound`.
    pub async fn authorize(
        &self,
        id: &SessionId,
        token: &str,
    ) -> Result<SessionRecord, OrchestratorError> {
        let identity = self.verifier.verify(token).await?;
        match self.registry.get(id).await {
            Some(record) if record.owner.user_id == identity.user_id => Ok(record),
            _ => Err(OrchestratorError::NotFound),
        }
    }

    /// Record activity on the session. Returns whether it still exists.
    pub async fn touch(&self, id: &SessionId) -> bool {
        self.registry.touch(id).await
    }

    /// Remove the caller's session and release its sandbox.
    ///
    /// Terminating an absent session succeeds with nothing to do, so retries
    /// and racing callers all see the same outcome.
    pub async fn terminate(
        &self,
        id: &SessionId,
        token: &str,
    ) -> Result<TerminationReport, OrchestratorError> {
        let identity = self.verifier.verify(token).await?;
        match self.registry.remove_if_owner(id, identity.user_id).await {
            Some(record) => {
                info!(session = %id, user = identity.user_id, "session terminated");
                let warning = self.release(&record).await;
                Ok(TerminationReport { warning })
            }
            None => {
                debug!(session = %id, user = identity.user_id, "terminate on absent session");
                Ok(TerminationReport::default())
            }
        }
    }

    /// One sweep pass: remove and release every session idle past the
    /// budget. Returns how many were reclaimed.
    pub async fn reclaim_expired(&self) -> usize {
        let mut reclaimed = 0;
        for id in self.registry.snapshot_ids().await {
            let Some(record) = self.registry.remove_if_idle(&id, self.idle_budget).await else {
                continue;
            };
            info!(
                session = %id,
                user = record.owner.user_id,
                idle_secs = record.idle_secs(Utc::now()),
                "reclaiming idle session"
            );
            let release = tokio::time::timeout(SWEEP_RELEASE_GRACE, self.release(&record));
            if release.await.is_err() {
                warn!(
                    session = %id,
                    sandbox = %record.sandbox_id,
                    "sandbox release timed out during sweep"
                );
            }
            reclaimed += 1;
        }
        reclaimed
    }

    /// Tear down every live session. Used on graceful shutdown.
    pub async fn shutdown_all(&self) -> usize {
        let records = self.registry.drain().await;
        for record in &records {
            self.release(record).await;
        }
        records.len()
    }

    pub async fn active_sessions(&self) -> usize {
        self.registry.count().await
    }

    pub fn idle_budget(&self) -> Duration {
        self.idle_budget
    }

    /// Stop and remove the backing sandbox. Both steps run even if the first
    /// fails; any failure comes back as a warning for the caller to surface.
    async fn release(&self, record: &SessionRecord) -> Option<String> {
        let mut failures = Vec::new();
        if let Err(e) = self.provider.stop(&record.sandbox_id).await {
            failures.push(format!("stop: {e}"));
        }
        if let Err(e) = self.provider.remove(&record.sandbox_id).await {
            failures.push(format!("remove: {e}"));
        }
        if failures.is_empty() {
            return None;
        }
        let err = OrchestratorError::PartialFailure(failures.join("; "));
        warn!(
            session = %record.id,
            sandbox = %record.sandbox_id,
            error = %err,
            "sandbox may be orphaned"
        );
        Some(err.to_string())
    }
}
