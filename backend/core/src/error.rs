use thiserror::Error;

/// Top-level error taxonomy for the dockhand orchestrator.
///
/// Every caller-visible failure is one of these kinds; the gateway maps each
/// to an HTTP status and nothing unclassified crosses the API boundary.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Bad, missing, or expired credential.
    #[error("invalid or missing credentials")]
    Unauthorized,

    /// Session absent, or present but owned by someone else. The two cases
    /// are deliberately indistinguishable to the caller.
    #[error("session not found")]
    NotFound,

    /// Malformed input from the caller.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Sandbox creation failed or timed out; carries the provider's text.
    #[error("sandbox provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// A command or script could not be run at all. Distinct from a script
    /// that ran and exited non-zero.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Session removed from the registry but the sandbox release did not
    /// confirm. Surfaced as a warning inside a success response, never as a
    /// hard error; the sandbox may be orphaned and needs operator cleanup.
    #[error("sandbox release incomplete: {0}")]
    PartialFailure(String),
}
