//! Service catalog.
//!
//! The catalog is the read-only table of service definitions: service name →
//! version → [`ServiceSpec`]. A built-in catalog ships with berth; a YAML file
//! can overlay or extend it.
//!
//! # Example
//!
//! ```
//! use berth_core::catalog::Catalog;
//!
//! let catalog = Catalog::builtin();
//! let (version, spec) = catalog.resolve("postgres", Some("latest")).unwrap();
//! assert_eq!(version, "16");
//! assert!(!spec.is_multi_container());
//! ```

mod builtin;

use crate::error::{BerthError, Result};
use crate::types::{CatalogService, ServiceCategory, ServiceSpec};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument};

pub use builtin::BUILTIN_CATALOG;

/// Version request that resolves to the service's default version.
pub const LATEST: &str = "latest";

/// On-disk catalog document.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    services: BTreeMap<String, CatalogService>,
}

/// Read-only collection of catalog services.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    services: BTreeMap<String, CatalogService>,
}

impl Catalog {
    /// Build a catalog, validating every spec.
    pub fn new(services: impl IntoIterator<Item = CatalogService>) -> Result<Self> {
        let services = services.into_iter().map(|s| (s.name.clone(), s)).collect();
        let catalog = Self { services };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        BUILTIN_CATALOG.clone()
    }

    /// Parse a YAML catalog document.
    #[instrument(skip(content))]
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(content)
            .map_err(|e| BerthError::CatalogParse { reason: e.to_string() })?;

        let services = file.services.into_iter().map(|(name, mut service)| {
            service.name = name;
            service
        });
        Self::new(services)
    }

    /// Read and parse a YAML catalog file.
    #[instrument]
    pub fn load_file<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading catalog from {:?}", path);

        let content = std::fs::read_to_string(path)
            .map_err(|e| BerthError::Io { path: path.to_path_buf(), source: e })?;
        Self::from_yaml(&content)
    }

    /// Overlay `other` on this catalog; services in `other` replace same-named ones.
    #[must_use]
    pub fn merge(mut self, other: Catalog) -> Self {
        self.services.extend(other.services);
        self
    }

    /// Validate every version of every service.
    pub fn validate(&self) -> Result<()> {
        for (name, service) in &self.services {
            if service.versions.is_empty() {
                return Err(BerthError::invalid_spec(name, "-", "service declares no versions"));
            }
            if let Some(default) = &service.default_version {
                if !service.versions.contains_key(default) {
                    return Err(BerthError::VersionNotFound {
                        service: name.clone(),
                        version: default.clone(),
                    });
                }
            }
            for (version, spec) in &service.versions {
                spec.validate(name, version)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CatalogService> {
        self.services.get(name)
    }

    /// Look up a service, failing if it is not in the catalog.
    pub fn service(&self, name: &str) -> Result<&CatalogService> {
        self.get(name).ok_or_else(|| BerthError::ServiceNotFound { service: name.to_string() })
    }

    /// Resolve a version request to a concrete version and its spec.
    ///
    /// An explicit version must match a catalog key exactly. `latest` or an empty
    /// request picks the declared default, else the highest version.
    pub fn resolve(&self, name: &str, version: Option<&str>) -> Result<(String, &ServiceSpec)> {
        let service = self.service(name)?;

        let requested = version.map(str::trim).filter(|v| !v.is_empty() && *v != LATEST);
        let concrete = match requested {
            Some(v) => v.to_string(),
            None => service
                .default_version
                .clone()
                .or_else(|| service.versions.keys().max_by(|a, b| compare_versions(a, b)).cloned())
                .ok_or_else(|| BerthError::VersionNotFound {
                    service: name.to_string(),
                    version: LATEST.to_string(),
                })?,
        };

        let spec = service.versions.get(&concrete).ok_or_else(|| BerthError::VersionNotFound {
            service: name.to_string(),
            version: concrete.clone(),
        })?;

        Ok((concrete, spec))
    }

    /// All services, sorted by name.
    pub fn services(&self) -> impl Iterator<Item = &CatalogService> {
        self.services.values()
    }

    pub fn by_category(&self, category: ServiceCategory) -> Vec<&CatalogService> {
        self.services.values().filter(|s| s.category == category).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Numeric-aware version ordering: dot-separated segments compare as integers
/// when both parse, as strings otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '-']);
    let mut right = b.split(['.', '-']);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_YAML: &str = r#"
services:
  kv:
    category: cache
    versions:
      "9":
        image: kv:9
        port: 7000
      "10":
        image: kv:10
        port: 7000
  web:
    default_version: "2"
    versions:
      "2":
        image: web:2
        port: 80
        dependencies:
          - name: kv
"#;

    #[test]
    fn test_compare_versions_numeric() {
        assert_eq!(compare_versions("9", "10"), Ordering::Less);
        assert_eq!(compare_versions("14.2", "14.10"), Ordering::Less);
        assert_eq!(compare_versions("14", "14.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_from_yaml_sets_names() {
        let catalog = Catalog::from_yaml(CATALOG_YAML).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("kv").unwrap().name, "kv");
        assert_eq!(catalog.get("kv").unwrap().category, ServiceCategory::Cache);
    }

    #[test]
    fn test_resolve_latest_picks_highest() {
        let catalog = Catalog::from_yaml(CATALOG_YAML).unwrap();
        let (version, spec) = catalog.resolve("kv", None).unwrap();
        assert_eq!(version, "10");
        assert_eq!(spec.image.as_deref(), Some("kv:10"));

        let (version, _) = catalog.resolve("kv", Some("latest")).unwrap();
        assert_eq!(version, "10");
    }

    #[test]
    fn test_resolve_prefers_default_version() {
        let catalog = Catalog::from_yaml(CATALOG_YAML).unwrap();
        let (version, _) = catalog.resolve("web", Some("")).unwrap();
        assert_eq!(version, "2");
    }

    #[test]
    fn test_resolve_exact_match_only() {
        let catalog = Catalog::from_yaml(CATALOG_YAML).unwrap();
        assert!(catalog.resolve("kv", Some("9")).is_ok());
        let err = catalog.resolve("kv", Some("9.0")).unwrap_err();
        assert!(matches!(err, BerthError::VersionNotFound { .. }));
    }

    #[test]
    fn test_unknown_service() {
        let catalog = Catalog::builtin();
        let err = catalog.resolve("nope", None).unwrap_err();
        assert!(matches!(err, BerthError::ServiceNotFound { .. }));
    }

    #[test]
    fn test_invalid_spec_rejected_at_load() {
        let yaml = r#"
services:
  broken:
    versions:
      "1":
        port: 80
"#;
        let err = Catalog::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BerthError::InvalidSpec { .. }));
    }

    #[test]
    fn test_merge_overlay_wins() {
        let overlay = Catalog::from_yaml(
            r#"
services:
  postgres:
    versions:
      "17":
        image: postgres:17
        port: 5432
"#,
        )
        .unwrap();
        let merged = Catalog::builtin().merge(overlay);
        let (version, _) = merged.resolve("postgres", None).unwrap();
        assert_eq!(version, "17");
        assert!(merged.get("cache").is_some());
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin();
        assert!(catalog.validate().is_ok());
        assert!(!catalog.by_category(ServiceCategory::Database).is_empty());
    }
}
