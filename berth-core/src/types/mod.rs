//! Core domain types for berth.

pub mod catalog;
pub mod instance;

// Re-exports
pub use catalog::{
    CatalogService, ContainerSpec, DependencySpec, InitContainer, Protocol, ResourceLimits,
    ServiceCategory, ServiceSpec, VolumeSpec,
};
pub use instance::{aggregate_status, ContainerInfo, ContainerStatus, Instance, InstanceStatus};
