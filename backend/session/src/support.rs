//! Shared doubles for exercising the lifecycle without a docker daemon.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dockhand_core::{
    ExecOutput, IdentityVerifier, OrchestratorError, SandboxProvider, SessionId, UserIdentity,
};

/// Accepts tokens shaped `user-<n>` and maps them to user `n`.
#[derive(Default)]
pub(crate) struct StaticVerifier;

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<UserIdentity, OrchestratorError> {
        let user_id: i64 = token
            .strip_prefix("user-")
            .and_then(|n| n.parse().ok())
            .ok_or(OrchestratorError::Unauthorized)?;
        Ok(UserIdentity { user_id, email: format!("user{user_id}@example.com") })
    }
}

/// Counts provider calls and can be flipped into various failure modes.
#[derive(Default)]
pub(crate) struct RecordingProvider {
    created: AtomicUsize,
    stops: AtomicUsize,
    removes: AtomicUsize,
    execs: Mutex<Vec<String>>,
    pub fail_create: AtomicBool,
    pub fail_exec: AtomicBool,
    pub fail_release: AtomicBool,
    pub exit_code: AtomicI64,
    pub create_delay_ms: AtomicU64,
}

impl RecordingProvider {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn exec_log(&self) -> Vec<String> {
        self.execs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxProvider for RecordingProvider {
    async fn create(&self, session: &SessionId) -> anyhow::Result<String> {
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            anyhow::bail!("docker run failed: image pull error");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("dockhand-sbx-{session}"))
    }

    async fn exec(&self, _sandbox: &str, command: &str) -> anyhow::Result<ExecOutput> {
        if self.fail_exec.load(Ordering::SeqCst) {
            anyhow::bail!("docker exec failed: Cannot connect to the Docker daemon");
        }
        self.execs.lock().unwrap().push(command.to_string());
        Ok(ExecOutput {
            output: format!("ran: {command}\n"),
            exit_code: self.exit_code.load(Ordering::SeqCst),
        })
    }

    async fn stop(&self, _sandbox: &str) -> anyhow::Result<()> {
        if self.fail_release.load(Ordering::SeqCst) {
            anyhow::bail!("docker stop failed: daemon unreachable");
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, _sandbox: &str) -> anyhow::Result<()> {
        if self.fail_release.load(Ordering::SeqCst) {
            anyhow::bail!("docker rm failed: daemon unreachable");
        }
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
