//! Docker-backed sandbox provisioning for dockhand sessions.

pub mod docker;

pub use docker::{DockerCli, DockerConfig};
