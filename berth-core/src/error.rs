//! Error types for berth.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.
//! Variants are grouped by the failure class they belong to; [`BerthError::kind`]
//! exposes that class so callers can branch without matching every variant.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for berth operations.
pub type Result<T> = std::result::Result<T, BerthError>;

/// Main error type for berth.
#[derive(Error, Debug)]
pub enum BerthError {
    // Catalog / validation errors
    #[error("Invalid spec for {service}@{version}: {reason}")]
    InvalidSpec { service: String, version: String, reason: String },

    #[error("Service not found in catalog: {service}")]
    ServiceNotFound { service: String },

    #[error("Version {version} not found for service {service}")]
    VersionNotFound { service: String, version: String },

    #[error("Catalog parse error: {reason}")]
    CatalogParse { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Cycle errors
    #[error("Circular dependency detected at service {service}: {chain}")]
    CircularDependency { service: String, chain: String },

    #[error("Container startup cycle in instance {instance} involving container {container}")]
    ContainerCycle { instance: String, container: String },

    #[error("Init container cycle in instance {instance} involving init container {container}")]
    InitContainerCycle { instance: String, container: String },

    // Runtime errors
    #[error("Runtime {operation} failed for {target}: {reason}")]
    Runtime { operation: String, target: String, reason: String },

    #[error("Failed to pull image {image}: {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("Container {container} did not reach running state (status: {status})")]
    ContainerNotRunning { container: String, status: String },

    #[error("Init container {name} exited with code {exit_code}\n{logs}")]
    InitContainerFailed { name: String, exit_code: i64, logs: String },

    #[error("Init container {name} did not finish within {timeout_secs}s")]
    InitContainerTimeout { name: String, timeout_secs: u64 },

    // Data conflicts
    #[error("Instance already exists: {name} (use replace to recreate it)")]
    InstanceExists { name: String },

    // Store errors
    #[error("Instance not found: {name}")]
    InstanceNotFound { name: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure class of a [`BerthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed spec or unknown catalog entry. Never retried.
    Validation,
    /// Dependency or container ordering cycle.
    Cycle,
    /// Image pull, container create/start/stop failure.
    Runtime,
    /// Existing instance or data needs an explicit decision.
    DataConflict,
    /// Instance does not exist.
    NotFound,
    /// Persistence failure.
    Store,
    /// Local file system failure.
    Io,
    Other,
}

impl BerthError {
    /// Failure class for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSpec { .. }
            | Self::ServiceNotFound { .. }
            | Self::VersionNotFound { .. }
            | Self::CatalogParse { .. }
            | Self::InvalidConfig { .. } => ErrorKind::Validation,
            Self::CircularDependency { .. }
            | Self::ContainerCycle { .. }
            | Self::InitContainerCycle { .. } => ErrorKind::Cycle,
            Self::Runtime { .. }
            | Self::ImagePullFailed { .. }
            | Self::ContainerNotRunning { .. }
            | Self::InitContainerFailed { .. }
            | Self::InitContainerTimeout { .. } => ErrorKind::Runtime,
            Self::InstanceExists { .. } => ErrorKind::DataConflict,
            Self::InstanceNotFound { .. } => ErrorKind::NotFound,
            Self::DatabaseError(_) | Self::MigrationFailed { .. } => ErrorKind::Store,
            Self::Io { .. } => ErrorKind::Io,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Build a runtime error for `operation` against `target`.
    pub fn runtime(
        operation: impl Into<String>,
        target: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Runtime {
            operation: operation.into(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an invalid-spec error.
    pub fn invalid_spec(
        service: impl Into<String>,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSpec {
            service: service.into(),
            version: version.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for BerthError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_variants() {
        let err = BerthError::CircularDependency {
            service: "a".to_string(),
            chain: "a -> b -> a".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Cycle);

        let err = BerthError::InstanceExists { name: "cache-7".to_string() };
        assert_eq!(err.kind(), ErrorKind::DataConflict);

        let err = BerthError::runtime("start", "berth-cache-7", "exit status 1");
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert!(err.to_string().contains("berth-cache-7"));
    }

    #[test]
    fn test_init_failure_carries_logs() {
        let err = BerthError::InitContainerFailed {
            name: "migrate".to_string(),
            exit_code: 2,
            logs: "relation does not exist".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exited with code 2"));
        assert!(msg.contains("relation does not exist"));
    }
}
