//! Session lifecycle for dockhand: the in-memory registry, token-gated
//! create/terminate, script validation, and idle reclamation.

pub mod lifecycle;
pub mod reclaimer;
pub mod registry;
pub mod validate;

#[cfg(test)]
pub(crate) mod support;

pub use lifecycle::{SessionManager, TerminationReport, DEFAULT_IDLE_BUDGET};
pub use reclaimer::{Reclaimer, DEFAULT_SWEEP_INTERVAL};
pub use registry::SessionRegistry;
pub use validate::{ValidationReport, ValidationRunner};
