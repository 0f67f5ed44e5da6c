//! Install and remove options, and the conflict-decision seam.

use crate::resolver::DependencyPlanEntry;
use crate::types::{Instance, ResourceLimits};
use std::collections::BTreeMap;

/// What to install and how.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub service: String,
    /// Exact catalog version; `None` or "latest" picks the default
    pub version: Option<String>,
    /// Explicit instance name; defaults to `<service>-<version>`
    pub instance_name: Option<String>,
    /// Environment overrides, applied over catalog defaults
    pub environment: BTreeMap<String, String>,
    /// Resource overrides, applied over catalog defaults
    pub resources: ResourceLimits,
    /// Skip the dependency pre-pass
    pub skip_dependencies: bool,
    /// Replace an existing instance with the same name without asking
    pub replace: bool,
    /// Pick a fresh `<service>-<version>-N` name instead of conflicting
    pub new_instance: bool,
    /// Installed to satisfy another service; never prompts
    pub is_dependency: bool,
    /// Override the service's `expose` flag
    pub expose: Option<bool>,
}

impl InstallOptions {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into(), ..Default::default() }
    }

    /// Options for auto-installing a plan entry: named after the service,
    /// internal-only, with the declaring dependency's environment.
    pub fn dependency(entry: &DependencyPlanEntry) -> Self {
        Self {
            service: entry.service.clone(),
            version: Some(entry.version.clone()),
            instance_name: Some(entry.service.clone()),
            environment: entry.environment.clone(),
            skip_dependencies: true,
            is_dependency: true,
            expose: Some(false),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn resources(mut self, resources: ResourceLimits) -> Self {
        self.resources = resources;
        self
    }

    #[must_use]
    pub fn skip_dependencies(mut self) -> Self {
        self.skip_dependencies = true;
        self
    }

    #[must_use]
    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    #[must_use]
    pub fn new_instance(mut self) -> Self {
        self.new_instance = true;
        self
    }

    #[must_use]
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = Some(expose);
        self
    }
}

/// Result of an install call.
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Installed(Instance),
    /// The conflict resolver declined to touch existing data. No container was
    /// created; a replace confirmed earlier in the same call has already
    /// removed the previous instance, keeping its volumes and environment.
    Cancelled,
}

impl InstallOutcome {
    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Self::Installed(instance) => Some(instance),
            Self::Cancelled => None,
        }
    }

    pub fn into_instance(self) -> Option<Instance> {
        match self {
            Self::Installed(instance) => Some(instance),
            Self::Cancelled => None,
        }
    }
}

/// Leftovers of an earlier install under the same instance name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingData {
    pub instance: String,
    pub volumes: Vec<String>,
    pub environment: Option<BTreeMap<String, String>>,
}

/// What to do with [`ExistingData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDecision {
    /// Keep volumes and merge the stored environment over the new one
    Reuse,
    /// Remove volumes and stored environment, then install clean
    Delete,
    /// Abort the install
    Cancel,
}

/// Decisions the orchestrator cannot make on its own.
///
/// Dependency installs never consult the resolver.
pub trait ConflictResolver: Send + Sync {
    /// Replace `existing`, which has the requested instance name?
    fn confirm_replace(&self, existing: &Instance) -> bool;

    fn existing_data(&self, data: &ExistingData) -> DataDecision;
}

/// Resolver answering from preset values.
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver {
    pub replace: bool,
    pub data: DataDecision,
}

impl FixedResolver {
    pub fn new(replace: bool, data: DataDecision) -> Self {
        Self { replace, data }
    }
}

impl Default for FixedResolver {
    /// Never replace; reuse existing data.
    fn default() -> Self {
        Self { replace: false, data: DataDecision::Reuse }
    }
}

impl ConflictResolver for FixedResolver {
    fn confirm_replace(&self, _existing: &Instance) -> bool {
        self.replace
    }

    fn existing_data(&self, _data: &ExistingData) -> DataDecision {
        self.data
    }
}

/// Options for removing an instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Keep volumes and the stored environment for a later reinstall
    pub keep_volumes: bool,
}

/// What a remove did, including best-effort steps that failed.
#[derive(Debug, Clone, Default)]
pub struct RemoveReport {
    pub instance: String,
    pub removed_containers: usize,
    pub removed_volumes: Vec<String>,
    pub warnings: Vec<String>,
}
