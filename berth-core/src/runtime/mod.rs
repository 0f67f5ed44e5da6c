//! Container runtime abstraction.
//!
//! The orchestrator drives containers through the `ContainerRuntime` trait:
//! - `DockerCli`: the `docker` binary (primary)
//! - test doubles in integration tests

use crate::error::Result;
use crate::types::{ContainerStatus, ResourceLimits};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod docker;

pub use docker::DockerCli;

/// Container runtime trait.
///
/// Containers are addressed by ID or name interchangeably. Removing a container
/// or volume that no longer exists succeeds.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container. Returns the runtime ID.
    async fn create_container(&self, request: &ContainerRequest) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container, forcing it after `timeout`.
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()>;

    async fn restart_container(&self, id: &str, timeout: Duration) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Inspect a container. A container that does not exist reports
    /// [`RuntimeStatus::Missing`].
    async fn inspect_container(&self, id: &str) -> Result<ContainerState>;

    /// Names of containers carrying `selector` (`key=value`).
    async fn list_containers(&self, selector: &str) -> Result<Vec<String>>;

    /// Whether the image is cached locally.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create the network if it does not exist yet.
    async fn ensure_network(&self, network: &str) -> Result<()>;

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: &[String],
    ) -> Result<()>;

    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()>;

    /// Names of volumes starting with `prefix`.
    async fn list_volumes(&self, prefix: &str) -> Result<Vec<String>>;

    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Create, start and wait for a container to exit, then collect its logs
    /// and remove it. Fails with a timeout error if it runs longer than `timeout`.
    async fn run_to_completion(
        &self,
        request: &ContainerRequest,
        timeout: Duration,
    ) -> Result<RunOutput>;

    /// Runtime name (for logging/metrics).
    fn name(&self) -> &str;
}

/// Everything needed to create one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerRequest {
    /// Runtime container name
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub exposed_ports: Vec<u16>,
    pub resources: ResourceLimits,
    /// Command override; empty keeps the image default
    pub command: Vec<String>,
    /// Network joined at creation time
    pub network: Option<String>,
}

/// Named volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub volume: String,
    pub target: String,
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub status: RuntimeStatus,
    pub exit_code: Option<i64>,
    pub oom_killed: bool,
    pub health: Option<String>,
}

impl ContainerState {
    /// State of a container the runtime does not know.
    pub fn missing() -> Self {
        Self { status: RuntimeStatus::Missing, exit_code: None, oom_killed: false, health: None }
    }

    pub fn is_running(&self) -> bool {
        self.status == RuntimeStatus::Running
    }

    /// Stored status for this runtime state.
    pub fn container_status(&self) -> ContainerStatus {
        match self.status {
            RuntimeStatus::Running => ContainerStatus::Running,
            RuntimeStatus::Exited if self.oom_killed => ContainerStatus::Failed,
            RuntimeStatus::Exited | RuntimeStatus::Paused => ContainerStatus::Stopped,
            RuntimeStatus::Created => ContainerStatus::Created,
            RuntimeStatus::Dead | RuntimeStatus::Restarting => ContainerStatus::Failed,
            RuntimeStatus::Missing => ContainerStatus::Unknown,
        }
    }
}

/// Runtime-level container status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Missing,
}

impl RuntimeStatus {
    /// Parse the status string reported by `docker inspect`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "restarting" => Some(Self::Restarting),
            "exited" | "removing" => Some(Self::Exited),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Missing => "missing",
        };
        write!(f, "{}", s)
    }
}

/// Result of a run-to-completion container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i64,
    pub logs: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: RuntimeStatus, oom_killed: bool) -> ContainerState {
        ContainerState { status, exit_code: Some(0), oom_killed, health: None }
    }

    #[test]
    fn test_container_status_mapping() {
        assert_eq!(state(RuntimeStatus::Running, false).container_status(), ContainerStatus::Running);
        assert_eq!(state(RuntimeStatus::Exited, false).container_status(), ContainerStatus::Stopped);
        assert_eq!(state(RuntimeStatus::Exited, true).container_status(), ContainerStatus::Failed);
        assert_eq!(state(RuntimeStatus::Dead, false).container_status(), ContainerStatus::Failed);
        assert_eq!(ContainerState::missing().container_status(), ContainerStatus::Unknown);
    }

    #[test]
    fn test_parse_runtime_status() {
        assert_eq!(RuntimeStatus::parse("Running"), Some(RuntimeStatus::Running));
        assert_eq!(RuntimeStatus::parse("exited"), Some(RuntimeStatus::Exited));
        assert_eq!(RuntimeStatus::parse("bogus"), None);
    }
}
