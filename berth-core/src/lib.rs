//! Berth Core Library
//!
//! The service orchestration engine behind the `berth` command: catalog,
//! dependency resolution, container orchestration and the instance store.

pub mod catalog;
pub mod config;
pub mod error;
pub mod labels;
pub mod naming;
pub mod observability;
pub mod orchestrator;
pub mod paths;
pub mod registrar;
pub mod resolver;
pub mod runtime;
pub mod state;
pub mod topo;
pub mod types;

// Re-export commonly used items
pub use catalog::Catalog;
pub use config::{Config, OrchestratorSettings};
pub use error::{BerthError, ErrorKind, Result};
pub use observability::init as init_observability;
pub use orchestrator::{
    ConflictResolver, DataDecision, ExistingData, FixedResolver, InstallOptions, InstallOutcome,
    Orchestrator, RemoveOptions, RemoveReport,
};
pub use registrar::{HostsFileRegistrar, NoopRegistrar, ServiceRegistrar};
pub use resolver::{DependencyPlan, DependencyPlanEntry, DependencyResolver};
pub use runtime::{ContainerRuntime, DockerCli};
pub use state::StateManager;
pub use types::{
    CatalogService, ContainerInfo, ContainerStatus, Instance, InstanceStatus, ServiceSpec,
};
