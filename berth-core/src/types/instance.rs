//! Instance domain types.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// An installed service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Unique instance name (store key)
    pub name: String,

    /// Catalog service this instance was installed from
    pub service: String,

    /// Concrete catalog version
    pub version: String,

    pub status: InstanceStatus,

    /// Runtime container ID for single-container instances
    pub container_id: Option<String>,

    /// Containers of a multi-container instance, in creation order
    #[serde(default)]
    pub containers: Vec<ContainerInfo>,

    /// Port routed by the reverse proxy, if exposed
    pub port: Option<u16>,

    /// Routed through the reverse proxy
    pub exposed: bool,

    /// Installed automatically to satisfy another service
    pub dependency: bool,

    pub created_at: SystemTime,
}

impl Instance {
    pub fn is_multi_container(&self) -> bool {
        !self.containers.is_empty()
    }

    /// Primary container of a multi-container instance.
    pub fn primary_container(&self) -> Option<&ContainerInfo> {
        self.containers.iter().find(|c| c.primary).or_else(|| self.containers.first())
    }
}

/// Instance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Failed,
    Unknown,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown instance status: {}", s)),
        }
    }
}

/// One container of a multi-container instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container name within the service
    pub name: String,

    /// Runtime container ID
    pub id: String,

    /// Runtime container name (`<prefix>-<instance>-<name>`)
    pub full_name: String,

    pub primary: bool,

    pub status: ContainerStatus,

    pub image: String,
}

/// Status of a single managed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
    Failed,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Fold container statuses into one instance status.
///
/// Any failure wins. A mix of running and stopped containers reports as
/// running: a partially-up instance is shown as up, there is no degraded state.
pub fn aggregate_status(statuses: &[ContainerStatus]) -> InstanceStatus {
    if statuses.is_empty() {
        return InstanceStatus::Unknown;
    }
    if statuses.contains(&ContainerStatus::Failed) {
        return InstanceStatus::Failed;
    }

    let running = statuses.iter().filter(|s| **s == ContainerStatus::Running).count();
    let stopped = statuses
        .iter()
        .filter(|s| matches!(s, ContainerStatus::Stopped | ContainerStatus::Created))
        .count();

    if running == statuses.len() {
        InstanceStatus::Running
    } else if stopped == statuses.len() {
        InstanceStatus::Stopped
    } else if running + stopped == statuses.len() {
        InstanceStatus::Running
    } else {
        InstanceStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContainerStatus::*;

    #[test]
    fn test_aggregate_any_failure_is_failed() {
        assert_eq!(aggregate_status(&[Running, Running, Failed]), InstanceStatus::Failed);
        assert_eq!(aggregate_status(&[Stopped, Failed]), InstanceStatus::Failed);
    }

    #[test]
    fn test_aggregate_uniform_sets() {
        assert_eq!(aggregate_status(&[Running, Running]), InstanceStatus::Running);
        assert_eq!(aggregate_status(&[Stopped, Stopped]), InstanceStatus::Stopped);
    }

    #[test]
    fn test_aggregate_partial_is_running() {
        assert_eq!(aggregate_status(&[Running, Stopped]), InstanceStatus::Running);
    }

    #[test]
    fn test_aggregate_unknown() {
        assert_eq!(aggregate_status(&[]), InstanceStatus::Unknown);
        assert_eq!(aggregate_status(&[Running, Unknown]), InstanceStatus::Unknown);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            InstanceStatus::Running,
            InstanceStatus::Stopped,
            InstanceStatus::Failed,
            InstanceStatus::Unknown,
        ] {
            assert_eq!(status.to_string().parse::<InstanceStatus>().unwrap(), status);
        }
    }
}
