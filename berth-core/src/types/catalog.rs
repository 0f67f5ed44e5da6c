//! Catalog domain types.
//!
//! A catalog maps service name → version → [`ServiceSpec`]. Specs are loaded once
//! and never mutated at runtime.

use crate::error::{BerthError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Service category for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    /// Database systems (PostgreSQL, MySQL, MongoDB, etc.)
    Database,
    /// In-memory caches (Redis, Memcached, etc.)
    Cache,
    /// Message queues (RabbitMQ, NATS, etc.)
    Queue,
    /// Monitoring and tracing stacks
    Observability,
    /// Storage systems (MinIO, etc.)
    Storage,
    /// Analytics and BI tools
    Analytics,
    #[default]
    Other,
}

impl ServiceCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Queue => "queue",
            Self::Observability => "observability",
            Self::Storage => "storage",
            Self::Analytics => "analytics",
            Self::Other => "other",
        }
    }

    /// Parse category from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "database" => Some(Self::Database),
            "cache" => Some(Self::Cache),
            "queue" => Some(Self::Queue),
            "observability" => Some(Self::Observability),
            "storage" => Some(Self::Storage),
            "analytics" => Some(Self::Analytics),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wire protocol a service speaks on its exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// A service in the catalog with all of its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogService {
    /// Service name (also the default dependency instance name)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub category: ServiceCategory,

    #[serde(default)]
    pub description: String,

    /// Version used for "latest" or an empty version request
    #[serde(default)]
    pub default_version: Option<String>,

    /// Version string → spec
    pub versions: BTreeMap<String, ServiceSpec>,
}

/// Immutable definition of one service version.
///
/// Exactly one of `image` (single-container) or `containers` (multi-container)
/// is set; [`ServiceSpec::validate`] enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    /// Image for single-container specs
    pub image: Option<String>,

    /// Containers for multi-container specs
    pub containers: Vec<ContainerSpec>,

    /// Externally reachable port
    pub port: Option<u16>,

    pub protocol: Protocol,

    /// Default environment
    pub environment: BTreeMap<String, String>,

    /// Named volumes (single-container specs; shared by all containers otherwise)
    pub volumes: Vec<VolumeSpec>,

    /// Command override for single-container specs
    pub command: Vec<String>,

    /// Run-once containers executed before any service container starts
    pub init_containers: Vec<InitContainer>,

    /// Other catalog services this one needs
    pub dependencies: Vec<DependencySpec>,

    /// Default resource limits
    pub resources: ResourceLimits,

    /// Whether the service is routed through the reverse proxy
    #[serde(default = "default_true")]
    pub expose: bool,
}

/// One container of a multi-container spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    /// Name, unique within the service
    pub name: String,

    pub image: String,

    /// Receives the externally reachable port and the instance-level alias
    pub primary: bool,

    /// Container ports; the primary container's first port is the exposed one
    pub ports: Vec<u16>,

    pub environment: BTreeMap<String, String>,

    pub volumes: Vec<VolumeSpec>,

    pub command: Vec<String>,

    /// Sibling container names (ordering) or external service names (resolved
    /// by the dependency resolver)
    pub depends_on: Vec<String>,

    pub resources: ResourceLimits,
}

/// Run-to-completion container executed once per installation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitContainer {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<VolumeSpec>,
    /// Other init containers that must finish first
    pub depends_on: Vec<String>,
}

/// Dependency on another catalog service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,

    /// "latest" or an exact catalog version key
    #[serde(default = "default_latest")]
    pub version: String,

    #[serde(default = "default_true")]
    pub required: bool,

    /// Environment applied to the dependency when it is auto-installed
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl DependencySpec {
    /// Required dependency on the latest version of `name`.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_latest(),
            required: true,
            environment: BTreeMap::new(),
        }
    }

    /// Optional dependency on the latest version of `name`.
    pub fn optional(name: impl Into<String>) -> Self {
        Self { required: false, ..Self::required(name) }
    }
}

/// Named volume mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume tag; the runtime volume is `<prefix>-<instance>-<name>`
    pub name: String,

    /// Mount path in the container
    pub target: String,
}

/// Resource limits. Unset fields mean "no limit" or "fall back to the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub memory_mb: Option<u64>,
    pub cpus: Option<f64>,
}

impl ResourceLimits {
    /// Field-wise overlay: values set in `self` win over `defaults`.
    #[must_use]
    pub fn or(self, defaults: ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            memory_mb: self.memory_mb.or(defaults.memory_mb),
            cpus: self.cpus.or(defaults.cpus),
        }
    }
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            image: None,
            containers: Vec::new(),
            port: None,
            protocol: Protocol::default(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            command: Vec::new(),
            init_containers: Vec::new(),
            dependencies: Vec::new(),
            resources: ResourceLimits::default(),
            expose: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_latest() -> String {
    "latest".to_string()
}

impl ServiceSpec {
    /// True when the service declares more than a single image.
    pub fn is_multi_container(&self) -> bool {
        !self.containers.is_empty()
    }

    /// Index of the primary container: the one marked primary, else the first.
    pub fn primary_index(&self) -> Option<usize> {
        if self.containers.is_empty() {
            return None;
        }
        Some(self.containers.iter().position(|c| c.primary).unwrap_or(0))
    }

    /// Externally reachable port: the primary container's first port, falling
    /// back to the service-level port.
    pub fn exposed_port(&self) -> Option<u16> {
        self.primary_index()
            .and_then(|idx| self.containers[idx].ports.first().copied())
            .or(self.port)
    }

    /// Check structural invariants.
    pub fn validate(&self, service: &str, version: &str) -> Result<()> {
        let invalid = |reason: String| BerthError::invalid_spec(service, version, reason);

        match (&self.image, self.containers.is_empty()) {
            (Some(_), false) => {
                return Err(invalid("spec declares both image and containers".to_string()))
            }
            (None, true) => {
                return Err(invalid("spec declares neither image nor containers".to_string()))
            }
            (Some(image), true) if image.trim().is_empty() => {
                return Err(invalid("image is empty".to_string()))
            }
            _ => {}
        }

        let mut names = HashSet::new();
        for container in &self.containers {
            if container.name.is_empty() {
                return Err(invalid("container without a name".to_string()));
            }
            if container.image.trim().is_empty() {
                return Err(invalid(format!("container {} has no image", container.name)));
            }
            if !names.insert(container.name.as_str()) {
                return Err(invalid(format!("duplicate container name {}", container.name)));
            }
        }

        let primaries = self.containers.iter().filter(|c| c.primary).count();
        if primaries > 1 {
            return Err(invalid(format!("{} containers are marked primary", primaries)));
        }

        if self.is_multi_container() && self.expose && self.exposed_port().is_none() {
            return Err(invalid("exposed multi-container spec has no main port".to_string()));
        }

        let mut init_names = HashSet::new();
        for init in &self.init_containers {
            if init.name.is_empty() || init.image.trim().is_empty() {
                return Err(invalid("init container needs a name and an image".to_string()));
            }
            if !init_names.insert(init.name.as_str()) {
                return Err(invalid(format!("duplicate init container name {}", init.name)));
            }
        }
        for init in &self.init_containers {
            let unknown = init.depends_on.iter().find(|d| !init_names.contains(d.as_str()));
            if let Some(unknown) = unknown {
                return Err(invalid(format!(
                    "init container {} depends on unknown init container {}",
                    init.name, unknown
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str, primary: bool) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: format!("example/{}:1", name),
            primary,
            ports: vec![8080],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_single_container() {
        let spec = ServiceSpec { image: Some("redis:7".to_string()), ..Default::default() };
        assert!(spec.validate("cache", "7").is_ok());
    }

    #[test]
    fn test_validate_rejects_image_and_containers() {
        let spec = ServiceSpec {
            image: Some("redis:7".to_string()),
            containers: vec![container("a", false)],
            ..Default::default()
        };
        let err = spec.validate("cache", "7").unwrap_err();
        assert!(matches!(err, BerthError::InvalidSpec { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_spec() {
        let spec = ServiceSpec::default();
        assert!(spec.validate("x", "1").is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let spec = ServiceSpec {
            containers: vec![container("a", false), container("a", false)],
            ..Default::default()
        };
        let err = spec.validate("x", "1").unwrap_err();
        assert!(err.to_string().contains("duplicate container name a"));
    }

    #[test]
    fn test_validate_rejects_multiple_primaries() {
        let spec = ServiceSpec {
            containers: vec![container("a", true), container("b", true)],
            ..Default::default()
        };
        assert!(spec.validate("x", "1").is_err());
    }

    #[test]
    fn test_validate_requires_main_port_when_exposed() {
        let mut a = container("a", false);
        a.ports.clear();
        let spec = ServiceSpec { containers: vec![a], ..Default::default() };
        assert!(spec.validate("x", "1").is_err());

        let mut internal = spec.clone();
        internal.expose = false;
        assert!(internal.validate("x", "1").is_ok());

        let mut with_port = spec;
        with_port.port = Some(9000);
        assert!(with_port.validate("x", "1").is_ok());
    }

    #[test]
    fn test_validate_init_dependencies() {
        let spec = ServiceSpec {
            image: Some("app:1".to_string()),
            init_containers: vec![InitContainer {
                name: "migrate".to_string(),
                image: "app:1".to_string(),
                depends_on: vec!["missing".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(spec.validate("app", "1").is_err());
    }

    #[test]
    fn test_primary_defaults_to_first() {
        let spec = ServiceSpec {
            containers: vec![container("a", false), container("b", false)],
            ..Default::default()
        };
        assert_eq!(spec.primary_index(), Some(0));

        let spec = ServiceSpec {
            containers: vec![container("a", false), container("b", true)],
            ..Default::default()
        };
        assert_eq!(spec.primary_index(), Some(1));
    }

    #[test]
    fn test_resource_overlay() {
        let user = ResourceLimits { memory_mb: Some(256), cpus: None };
        let defaults = ResourceLimits { memory_mb: Some(1024), cpus: Some(1.5) };
        let merged = user.or(defaults);
        assert_eq!(merged.memory_mb, Some(256));
        assert_eq!(merged.cpus, Some(1.5));
    }

    #[test]
    fn test_dependency_defaults_from_yaml() {
        let dep: DependencySpec = serde_yaml::from_str("name: postgres").unwrap();
        assert_eq!(dep.version, "latest");
        assert!(dep.required);
        assert!(dep.environment.is_empty());
    }
}
