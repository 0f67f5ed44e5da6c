//! Dependency resolution.
//!
//! Turns a requested service into an installation plan: a dependency-first list
//! of every service reachable through required [`DependencySpec`] edges.
//!
//! [`DependencySpec`]: crate::types::DependencySpec

use crate::catalog::{Catalog, LATEST};
use crate::error::{BerthError, Result};
use crate::state::StateManager;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// One service in an installation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyPlanEntry {
    pub service: String,
    /// Concrete catalog version
    pub version: String,
    pub required: bool,
    /// An instance named after the service already exists
    pub is_installed: bool,
    /// Environment overrides from the declaring dependency
    pub environment: BTreeMap<String, String>,
}

/// Resolver output. Entries are dependency-first; the root is the last
/// required entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyPlan {
    pub root: String,
    pub entries: Vec<DependencyPlanEntry>,
}

impl DependencyPlan {
    /// Required dependencies that still need installing, in install order.
    /// Never includes the root or anything already installed.
    pub fn missing_dependencies(&self) -> Vec<&DependencyPlanEntry> {
        self.entries
            .iter()
            .filter(|e| e.required && !e.is_installed && e.service != self.root)
            .collect()
    }

    pub fn get(&self, service: &str) -> Option<&DependencyPlanEntry> {
        self.entries.iter().find(|e| e.service == service)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Edge being followed.
struct Request<'r> {
    service: &'r str,
    version: &'r str,
    environment: &'r BTreeMap<String, String>,
}

/// Walk state of one resolution.
#[derive(Default)]
struct Walk {
    marks: HashMap<String, Mark>,
    stack: Vec<String>,
    required: Vec<DependencyPlanEntry>,
    optional: Vec<DependencyPlanEntry>,
}

/// Dependency resolver over a catalog and the set of installed instances.
pub struct DependencyResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolve `service` against the instances currently in the store.
    #[instrument(skip(self, state))]
    pub async fn resolve(
        &self,
        state: &StateManager,
        service: &str,
        version: Option<&str>,
    ) -> Result<DependencyPlan> {
        let installed: HashSet<String> = state.instance_names().await?.into_iter().collect();
        self.plan(service, version, &installed)
    }

    /// Resolve `service` given the names of installed instances.
    ///
    /// A dependency counts as installed when an instance named after the
    /// service exists; installed dependencies are not walked further. The
    /// first version seen for a service wins.
    pub fn plan(
        &self,
        service: &str,
        version: Option<&str>,
        installed: &HashSet<String>,
    ) -> Result<DependencyPlan> {
        let mut walk = Walk::default();
        let no_env = BTreeMap::new();
        let root = Request { service, version: version.unwrap_or(LATEST), environment: &no_env };
        self.visit(&root, true, installed, &mut walk)?;

        let required: HashSet<String> = walk.required.iter().map(|e| e.service.clone()).collect();
        let mut entries = walk.required;
        let root_entry = entries.pop();
        entries.extend(walk.optional.into_iter().filter(|e| !required.contains(&e.service)));
        entries.extend(root_entry);

        debug!(entries = entries.len(), "Dependency plan resolved");
        Ok(DependencyPlan { root: service.to_string(), entries })
    }

    fn visit(
        &self,
        request: &Request<'_>,
        is_root: bool,
        installed: &HashSet<String>,
        walk: &mut Walk,
    ) -> Result<()> {
        match walk.marks.get(request.service) {
            Some(Mark::InProgress) => {
                let start = walk.stack.iter().position(|s| s == request.service).unwrap_or(0);
                let mut chain = walk.stack[start..].to_vec();
                chain.push(request.service.to_string());
                return Err(BerthError::CircularDependency {
                    service: request.service.to_string(),
                    chain: chain.join(" -> "),
                });
            }
            Some(Mark::Done) => return Ok(()),
            None => {}
        }

        let (version, spec) = self.catalog.resolve(request.service, Some(request.version))?;
        spec.validate(request.service, &version)?;
        let is_installed = installed.contains(request.service);

        let entry = DependencyPlanEntry {
            service: request.service.to_string(),
            version: version.clone(),
            required: true,
            is_installed,
            environment: request.environment.clone(),
        };

        if is_installed && !is_root {
            walk.marks.insert(request.service.to_string(), Mark::Done);
            walk.required.push(entry);
            return Ok(());
        }

        walk.marks.insert(request.service.to_string(), Mark::InProgress);
        walk.stack.push(request.service.to_string());

        for dep in &spec.dependencies {
            if dep.required {
                let next = Request {
                    service: &dep.name,
                    version: &dep.version,
                    environment: &dep.environment,
                };
                self.visit(&next, false, installed, walk)?;
            } else {
                self.record_optional(&dep.name, &dep.version, &dep.environment, installed, walk);
            }
        }

        // Container-level references to other services
        let siblings: HashSet<&str> = spec.containers.iter().map(|c| c.name.as_str()).collect();
        let external: Vec<&String> = spec
            .containers
            .iter()
            .flat_map(|c| c.depends_on.iter())
            .filter(|d| !siblings.contains(d.as_str()))
            .collect();
        let no_env = BTreeMap::new();
        for name in external {
            let next = Request { service: name, version: LATEST, environment: &no_env };
            self.visit(&next, false, installed, walk)?;
        }

        walk.stack.pop();
        walk.marks.insert(request.service.to_string(), Mark::Done);
        walk.required.push(entry);
        Ok(())
    }

    /// Optional dependencies are listed but never walked or installed.
    fn record_optional(
        &self,
        service: &str,
        version: &str,
        environment: &BTreeMap<String, String>,
        installed: &HashSet<String>,
        walk: &mut Walk,
    ) {
        if walk.optional.iter().any(|e| e.service == service) {
            return;
        }
        match self.catalog.resolve(service, Some(version)) {
            Ok((version, _)) => walk.optional.push(DependencyPlanEntry {
                service: service.to_string(),
                version,
                required: false,
                is_installed: installed.contains(service),
                environment: environment.clone(),
            }),
            Err(e) => warn!(service, error = %e, "Skipping unresolvable optional dependency"),
        }
    }
}
