//! Docker-backed sandbox provider: container lifecycle via the docker CLI.
//!
//! One `DockerCli` serves every session; containers are addressed by a name
//! derived from the session id, so the provider itself holds no per-session
//! state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use dockhand_core::{ExecOutput, SandboxProvider, SessionId};

/// Configuration for sandbox containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    /// Docker image to run (default: docker:dind).
    pub image: String,
    /// Whether containers run privileged. Required for docker-in-docker.
    pub privileged: bool,
    /// Network mode ("none", "bridge", "host").
    pub network_mode: String,
    /// Memory limit (e.g. "512m", "1g").
    pub memory_limit: Option<String>,
    /// CPU quota (0.0-1.0 fraction of one core).
    pub cpu_quota: Option<f64>,
    /// Environment variables to inject.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Command appended after the image; empty means the image entrypoint.
    #[serde(default)]
    pub command: Vec<String>,
    /// Working directory for command execution inside the container.
    pub workdir: String,
    /// Bound on `docker run`, image pull included.
    pub create_timeout: Duration,
    /// Bound on a single `docker exec`.
    pub exec_timeout: Duration,
    /// Bound on `docker stop` / `docker rm`.
    pub stop_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        let mut env = HashMap::new();
        // dind refuses to start TLS-less unless this is explicitly empty.
        env.insert("DOCKER_TLS_CERTDIR".to_string(), String::new());
        Self {
            image: "docker:dind".to_string(),
            privileged: true,
            network_mode: "bridge".to_string(),
            memory_limit: Some("1g".to_string()),
            cpu_quota: None,
            env,
            command: Vec::new(),
            workdir: "/workspace".to_string(),
            create_timeout: Duration::from_secs(60),
            exec_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(15),
        }
    }
}

/// Sandbox provider backed by the local docker CLI.
pub struct DockerCli {
    config: DockerConfig,
}

impl DockerCli {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    fn container_name(session: &SessionId) -> String {
        format!("dockhand-sbx-{session}")
    }

    /// Args for `docker run`, name included. Env vars are emitted in sorted
    /// order so the invocation is deterministic.
    fn run_args(&self, name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--network".to_string(),
            self.config.network_mode.clone(),
        ];

        if self.config.privileged {
            args.push("--privileged".to_string());
        }

        if let Some(mem) = &self.config.memory_limit {
            args.push("-m".to_string());
            args.push(mem.clone());
        }

        if let Some(cpu) = self.config.cpu_quota {
            let quota = (cpu * 100_000.0) as i64;
            args.push("--cpu-period=100000".to_string());
            args.push(format!("--cpu-quota={quota}"));
        }

        let mut env: Vec<_> = self.config.env.iter().collect();
        env.sort();
        for (key, val) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={val}"));
        }

        args.push(self.config.image.clone());
        args.extend(self.config.command.iter().cloned());
        args
    }

    fn exec_args(&self, sandbox: &str, command: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            "-w".to_string(),
            self.config.workdir.clone(),
            sandbox.to_string(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]
    }

    /// Run one docker invocation with a hard deadline.
    async fn docker(&self, args: &[String], timeout: Duration) -> Result<std::process::Output> {
        let result = tokio::time::timeout(timeout, async {
            tokio::process::Command::new("docker").args(args).output().await
        })
        .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e).context("failed to spawn docker"),
            Err(_) => anyhow::bail!("docker {} timed out after {}s", args[0], timeout.as_secs()),
        }
    }
}

#[async_trait]
impl SandboxProvider for DockerCli {
    async fn create(&self, session: &SessionId) -> Result<String> {
        let name = Self::container_name(session);
        info!(container = %name, image = %self.config.image, "starting sandbox container");

        let args = self.run_args(&name);
        let output = self.docker(&args, self.config.create_timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("docker run failed: {}", stderr.trim());
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(container = %name, container_id = %container_id, "sandbox container started");
        Ok(name)
    }

    async fn exec(&self, sandbox: &str, command: &str) -> Result<ExecOutput> {
        debug!(container = %sandbox, command = %command, "executing in sandbox");

        let args = self.exec_args(sandbox, command);
        let output = self.docker(&args, self.config.exec_timeout).await?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        // A failing user command and a failing docker invocation both exit
        // non-zero; only the daemon's own errors count as provider failures.
        if !output.status.success() && is_daemon_error(&stderr) {
            anyhow::bail!("docker exec failed: {}", stderr.trim());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&stderr);
        Ok(ExecOutput {
            output: combined,
            exit_code: output.status.code().unwrap_or(-1) as i64,
        })
    }

    async fn stop(&self, sandbox: &str) -> Result<()> {
        info!(container = %sandbox, "stopping sandbox container");
        let args = vec![
            "stop".to_string(),
            "-t".to_string(),
            "5".to_string(),
            sandbox.to_string(),
        ];
        let output = self.docker(&args, self.config.stop_timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                debug!(container = %sandbox, "container already gone");
                return Ok(());
            }
            anyhow::bail!("docker stop failed: {}", stderr.trim());
        }
        Ok(())
    }

    async fn remove(&self, sandbox: &str) -> Result<()> {
        let args = vec!["rm".to_string(), "-f".to_string(), sandbox.to_string()];
        let output = self.docker(&args, self.config.stop_timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                debug!(container = %sandbox, "container already removed");
                return Ok(());
            }
            warn!(container = %sandbox, error = %stderr.trim(), "docker rm failed");
            anyhow::bail!("docker rm failed: {}", stderr.trim());
        }
        Ok(())
    }
}

fn is_daemon_error(stderr: &str) -> bool {
    stderr.contains("Error response from daemon")
        || stderr.contains("Cannot connect to the Docker daemon")
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.contains("No such container")
}
