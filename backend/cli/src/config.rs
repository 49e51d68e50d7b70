use serde::Deserialize;
use std::time::Duration;

use dockhand_sandbox::DockerConfig;

/// Dockhand runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Base URL of the auth service
    pub auth_url: String,
    /// Image sandbox containers run
    pub sandbox_image: String,
    /// Whether sandbox containers run privileged
    pub privileged: bool,
    /// Seconds a session may idle before reclamation
    pub session_ttl_secs: u64,
    /// Seconds between reclaimer sweeps
    pub sweep_interval_secs: u64,
    /// Seconds one sandbox command may run
    pub exec_timeout_secs: u64,
    /// Working directory for sandbox commands
    pub workdir: String,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5004,
            auth_url: "http://auth-service:5002".to_string(),
            sandbox_image: "docker:dind".to_string(),
            privileged: true,
            session_ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
            exec_timeout_secs: 30,
            workdir: "/workspace".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: std::env::var("DOCKHAND_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("DOCKHAND_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5004),
            auth_url: std::env::var("DOCKHAND_AUTH_URL")
                .unwrap_or_else(|_| "http://auth-service:5002".to_string()),
            sandbox_image: std::env::var("DOCKHAND_SANDBOX_IMAGE")
                .unwrap_or_else(|_| "docker:dind".to_string()),
            privileged: std::env::var("DOCKHAND_PRIVILEGED")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(true),
            session_ttl_secs: std::env::var("DOCKHAND_SESSION_TTL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30 * 60),
            sweep_interval_secs: std::env::var("DOCKHAND_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60),
            exec_timeout_secs: std::env::var("DOCKHAND_EXEC_TIMEOUT_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30),
            workdir: std::env::var("DOCKHAND_WORKDIR")
                .unwrap_or_else(|_| "/workspace".to_string()),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Sandbox provider settings derived from this config.
    pub fn docker_config(&self) -> DockerConfig {
        DockerConfig {
            image: self.sandbox_image.clone(),
            privileged: self.privileged,
            workdir: self.workdir.clone(),
            exec_timeout: Duration::from_secs(self.exec_timeout_secs),
            ..DockerConfig::default()
        }
    }
}
