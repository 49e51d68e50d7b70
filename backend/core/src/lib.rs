//! Core types, traits, and error taxonomy for the dockhand session orchestrator.

pub mod error;
pub mod traits;
pub mod types;

pub use error::OrchestratorError;
pub use traits::{IdentityVerifier, SandboxProvider};
pub use types::{ExecOutput, SessionId, SessionRecord, UserIdentity};
