use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::types::{ExecOutput, SessionId, UserIdentity};

/// Resolves a bearer token to the identity behind it.
///
/// Any failure to verify, including transport problems reaching the identity
/// service, surfaces as `Unauthorized`. Callers never learn why a token was
/// rejected.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserIdentity, OrchestratorError>;
}

/// Backend that provisions and drives sandboxes.
///
/// Implementations must bound every call with a timeout; the orchestrator
/// assumes no provider call blocks indefinitely.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a sandbox for the session and return its provider-side id.
    async fn create(&self, session: &SessionId) -> anyhow::Result<String>;

    /// Run a shell command inside the sandbox and capture its output.
    ///
    /// A command that runs and exits non-zero is still `Ok`; `Err` means the
    /// command could not be run at all.
    async fn exec(&self, sandbox: &str, command: &str) -> anyhow::Result<ExecOutput>;

    /// Stop the sandbox. Idempotent on an already-stopped sandbox.
    async fn stop(&self, sandbox: &str) -> anyhow::Result<()>;

    /// Remove the sandbox and its resources. Idempotent on an absent sandbox.
    async fn remove(&self, sandbox: &str) -> anyhow::Result<()>;
}
