//! Step validation: run a check script inside the session's sandbox.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use dockhand_core::{OrchestratorError, SandboxProvider, SessionId};

use crate::lifecycle::SessionManager;

/// What the caller learns from one validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub success: bool,
    pub output: String,
}

/// Runs caller-supplied check scripts inside a session's sandbox.
pub struct ValidationRunner {
    manager: Arc<SessionManager>,
    provider: Arc<dyn SandboxProvider>,
}

impl ValidationRunner {
    pub fn new(manager: Arc<SessionManager>, provider: Arc<dyn SandboxProvider>) -> Self {
        Self { manager, provider }
    }

    /// Run `script` in the session's sandbox and report whether it exited
    /// zero. A script whose checks fail is still a completed run, just with
    /// `success: false`; only a script that could not run at all is an error.
    pub async fn validate(
        &self,
        id: &SessionId,
        token: &str,
        script: &str,
    ) -> Result<ValidationReport, OrchestratorError> {
        let record = self.manager.authorize(id, token).await?;
        let script = script.trim();
        if script.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "validation script is required".to_string(),
            ));
        }

        let result = self
            .provider
            .exec(&record.sandbox_id, script)
            .await
            .map_err(|e| OrchestratorError::ExecutionFailed(e.to_string()))?;

        // A completed run counts as activity even when the checks fail.
        self.manager.touch(id).await;

        let success = result.succeeded();
        info!(session = %id, exit_code = result.exit_code, success, "validation script ran");
        Ok(ValidationReport { success, output: result.output })
    }
}
