//! Built-in catalog entries for common local development services.

use super::Catalog;
use crate::types::{
    CatalogService, ContainerSpec, DependencySpec, InitContainer, Protocol, ResourceLimits,
    ServiceCategory, ServiceSpec, VolumeSpec,
};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// The built-in catalog.
pub static BUILTIN_CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog {
    services: [postgres(), cache(), rabbitmq(), minio(), tracing_stack(), grafana(), metabase()]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect(),
});

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn volume(name: &str, target: &str) -> VolumeSpec {
    VolumeSpec { name: name.to_string(), target: target.to_string() }
}

fn service(
    name: &str,
    category: ServiceCategory,
    description: &str,
    default_version: Option<&str>,
    versions: Vec<(&str, ServiceSpec)>,
) -> CatalogService {
    CatalogService {
        name: name.to_string(),
        category,
        description: description.to_string(),
        default_version: default_version.map(str::to_string),
        versions: versions.into_iter().map(|(v, s)| (v.to_string(), s)).collect(),
    }
}

// =========================================================================
// Databases
// =========================================================================

fn postgres() -> CatalogService {
    let spec = |image: &str| ServiceSpec {
        image: Some(image.to_string()),
        port: Some(5432),
        protocol: Protocol::Tcp,
        environment: env(&[
            ("POSTGRES_USER", "postgres"),
            ("POSTGRES_PASSWORD", "postgres"),
            ("POSTGRES_DB", "postgres"),
        ]),
        volumes: vec![volume("data", "/var/lib/postgresql/data")],
        resources: ResourceLimits { memory_mb: Some(1024), cpus: None },
        ..Default::default()
    };

    service(
        "postgres",
        ServiceCategory::Database,
        "PostgreSQL object-relational database",
        Some("16"),
        vec![
            ("16", spec("postgres:16-alpine")),
            ("15", spec("postgres:15-alpine")),
            ("14", spec("postgres:14-alpine")),
        ],
    )
}

// =========================================================================
// Caches and queues
// =========================================================================

fn cache() -> CatalogService {
    let spec = |image: &str| ServiceSpec {
        image: Some(image.to_string()),
        port: Some(6379),
        protocol: Protocol::Tcp,
        command: vec!["redis-server".to_string(), "--appendonly".to_string(), "yes".to_string()],
        volumes: vec![volume("data", "/data")],
        resources: ResourceLimits { memory_mb: Some(256), cpus: None },
        ..Default::default()
    };

    service(
        "cache",
        ServiceCategory::Cache,
        "Redis in-memory key-value store",
        None,
        vec![("7", spec("redis:7-alpine")), ("6", spec("redis:6-alpine"))],
    )
}

fn rabbitmq() -> CatalogService {
    service(
        "rabbitmq",
        ServiceCategory::Queue,
        "RabbitMQ message broker with the management UI",
        None,
        vec![(
            "3.13",
            ServiceSpec {
                image: Some("rabbitmq:3.13-management-alpine".to_string()),
                port: Some(15672),
                environment: env(&[
                    ("RABBITMQ_DEFAULT_USER", "guest"),
                    ("RABBITMQ_DEFAULT_PASS", "guest"),
                ]),
                volumes: vec![volume("data", "/var/lib/rabbitmq")],
                resources: ResourceLimits { memory_mb: Some(512), cpus: None },
                ..Default::default()
            },
        )],
    )
}

fn minio() -> CatalogService {
    service(
        "minio",
        ServiceCategory::Storage,
        "MinIO S3-compatible object storage",
        None,
        vec![(
            "2024",
            ServiceSpec {
                image: Some("minio/minio:RELEASE.2024-06-13T22-53-53Z".to_string()),
                port: Some(9001),
                command: ["server", "/data", "--console-address", ":9001"]
                    .map(String::from)
                    .to_vec(),
                environment: env(&[
                    ("MINIO_ROOT_USER", "minioadmin"),
                    ("MINIO_ROOT_PASSWORD", "minioadmin"),
                ]),
                volumes: vec![volume("data", "/data")],
                ..Default::default()
            },
        )],
    )
}

// =========================================================================
// Observability
// =========================================================================

fn tracing_stack() -> CatalogService {
    let query = ContainerSpec {
        name: "query".to_string(),
        image: "jaegertracing/jaeger-query:1.57".to_string(),
        primary: true,
        ports: vec![16686],
        environment: env(&[("SPAN_STORAGE_TYPE", "badger")]),
        volumes: vec![volume("badger", "/badger")],
        ..Default::default()
    };
    let collector = ContainerSpec {
        name: "collector".to_string(),
        image: "jaegertracing/jaeger-collector:1.57".to_string(),
        ports: vec![4317, 14268],
        environment: env(&[("COLLECTOR_OTLP_ENABLED", "true")]),
        volumes: vec![volume("badger", "/badger")],
        depends_on: vec!["query".to_string()],
        ..Default::default()
    };

    service(
        "tracing",
        ServiceCategory::Observability,
        "Jaeger distributed tracing (query UI + collector)",
        None,
        vec![(
            "1.57",
            ServiceSpec {
                containers: vec![query, collector],
                environment: env(&[
                    ("BADGER_EPHEMERAL", "false"),
                    ("BADGER_DIRECTORY_VALUE", "/badger/data"),
                    ("BADGER_DIRECTORY_KEY", "/badger/key"),
                ]),
                ..Default::default()
            },
        )],
    )
}

fn grafana() -> CatalogService {
    let postgres = DependencySpec {
        environment: env(&[("POSTGRES_DB", "grafana")]),
        ..DependencySpec::required("postgres")
    };

    service(
        "grafana",
        ServiceCategory::Observability,
        "Grafana dashboards backed by PostgreSQL",
        None,
        vec![(
            "11",
            ServiceSpec {
                image: Some("grafana/grafana:11.1.0".to_string()),
                port: Some(3000),
                environment: env(&[
                    ("GF_DATABASE_TYPE", "postgres"),
                    ("GF_DATABASE_HOST", "postgres:5432"),
                    ("GF_DATABASE_NAME", "grafana"),
                    ("GF_DATABASE_USER", "postgres"),
                    ("GF_DATABASE_PASSWORD", "postgres"),
                ]),
                volumes: vec![volume("data", "/var/lib/grafana")],
                dependencies: vec![postgres, DependencySpec::optional("tracing")],
                ..Default::default()
            },
        )],
    )
}

// =========================================================================
// Analytics
// =========================================================================

fn metabase() -> CatalogService {
    let create_db = InitContainer {
        name: "create-db".to_string(),
        image: "postgres:16-alpine".to_string(),
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            "until pg_isready -h postgres -U postgres; do sleep 1; done; \
             psql -h postgres -U postgres -tc \"SELECT 1 FROM pg_database WHERE datname = 'metabase'\" \
             | grep -q 1 || psql -h postgres -U postgres -c 'CREATE DATABASE metabase'"
                .to_string(),
        ],
        environment: env(&[("PGPASSWORD", "postgres")]),
        ..Default::default()
    };

    service(
        "metabase",
        ServiceCategory::Analytics,
        "Metabase business intelligence backed by PostgreSQL",
        None,
        vec![(
            "0.50",
            ServiceSpec {
                image: Some("metabase/metabase:v0.50.8".to_string()),
                port: Some(3000),
                environment: env(&[
                    ("MB_DB_TYPE", "postgres"),
                    ("MB_DB_HOST", "postgres"),
                    ("MB_DB_PORT", "5432"),
                    ("MB_DB_DBNAME", "metabase"),
                    ("MB_DB_USER", "postgres"),
                    ("MB_DB_PASS", "postgres"),
                ]),
                init_containers: vec![create_db],
                dependencies: vec![DependencySpec::required("postgres")],
                resources: ResourceLimits { memory_mb: Some(1536), cpus: None },
                ..Default::default()
            },
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_stack_shape() {
        let catalog = Catalog::builtin();
        let (_, spec) = catalog.resolve("tracing", None).unwrap();
        assert!(spec.is_multi_container());
        let primary = &spec.containers[spec.primary_index().unwrap()];
        assert_eq!(primary.name, "query");
        assert_eq!(spec.exposed_port(), Some(16686));
    }

    #[test]
    fn test_grafana_declares_dependencies() {
        let catalog = Catalog::builtin();
        let (_, spec) = catalog.resolve("grafana", None).unwrap();
        let names: Vec<_> = spec.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["postgres", "tracing"]);
        assert!(!spec.dependencies[1].required);
    }
}
