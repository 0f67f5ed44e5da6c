//! Installation: dependency pre-pass, conflict handling and single-container
//! installs. Init containers and multi-container specs are handled in `multi`.

use super::options::{
    ConflictResolver, DataDecision, ExistingData, InstallOptions, InstallOutcome, RemoveOptions,
};
use super::{multi, warn_step, Orchestrator};
use crate::error::{BerthError, Result};
use crate::labels::{container_labels, ProxyExposure};
use crate::naming;
use crate::observability::metrics;
use crate::resolver::DependencyResolver;
use crate::runtime::{ContainerRequest, Mount};
use crate::types::{Instance, InstanceStatus, ServiceSpec, VolumeSpec};
use std::collections::{BTreeMap, HashSet};
use std::time::SystemTime;
use tracing::{info, instrument};

/// Everything the install paths need once name and version are settled.
pub(super) struct InstallPlan<'a> {
    pub options: &'a InstallOptions,
    pub spec: &'a ServiceSpec,
    pub name: String,
    pub version: String,
    /// User overrides merged with reused values; applied over every default
    pub overrides: BTreeMap<String, String>,
    pub exposed: bool,
}

impl InstallPlan<'_> {
    /// Proxy exposure for the instance's primary container.
    pub fn exposure(&self) -> Option<ProxyExposure> {
        if !self.exposed {
            return None;
        }
        self.spec.exposed_port().map(|port| ProxyExposure { port, protocol: self.spec.protocol })
    }

    /// Environment recorded for reuse on a later reinstall. Only explicit
    /// values are kept; catalog defaults are re-merged per container.
    pub fn snapshot(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }
}

impl Orchestrator {
    /// Install a service, auto-installing missing required dependencies first.
    ///
    /// Dependencies are installed in plan order, each as an internal instance
    /// named after its service. A dependency that was installed before a later
    /// step fails stays installed.
    #[instrument(skip(self, options, resolver), fields(service = %options.service))]
    pub async fn install(
        &self,
        options: InstallOptions,
        resolver: &dyn ConflictResolver,
    ) -> Result<InstallOutcome> {
        let result = self.install_with_dependencies(options, resolver).await;
        metrics::record_install(match &result {
            Ok(InstallOutcome::Installed(_)) => "installed",
            Ok(InstallOutcome::Cancelled) => "cancelled",
            Err(_) => "failed",
        });
        result
    }

    async fn install_with_dependencies(
        &self,
        options: InstallOptions,
        resolver: &dyn ConflictResolver,
    ) -> Result<InstallOutcome> {
        if !options.skip_dependencies {
            let plan = DependencyResolver::new(&self.catalog)
                .resolve(&self.state, &options.service, options.version.as_deref())
                .await?;

            for entry in plan.missing_dependencies() {
                info!(
                    dependency = %entry.service,
                    version = %entry.version,
                    "Installing dependency"
                );
                self.install_one(InstallOptions::dependency(entry), resolver).await?;
            }
        }

        self.install_one(options, resolver).await
    }

    /// Install exactly one instance.
    async fn install_one(
        &self,
        options: InstallOptions,
        resolver: &dyn ConflictResolver,
    ) -> Result<InstallOutcome> {
        let (version, spec) = self.catalog.resolve(&options.service, options.version.as_deref())?;
        spec.validate(&options.service, &version)?;

        let name = self.instance_name(&options, &version).await?;
        let _guard = self.locks.acquire(&name).await;

        if let Some(existing) = self.state.find_instance(&name).await? {
            if options.is_dependency
                || !(options.replace || resolver.confirm_replace(&existing))
            {
                return Err(BerthError::InstanceExists { name });
            }
            info!(instance = %name, "Replacing existing instance");
            let report = self.remove_locked(&existing, RemoveOptions { keep_volumes: true }).await?;
            for warning in &report.warnings {
                info!(instance = %name, "Replace: {}", warning);
            }
        }

        let mut reused = BTreeMap::new();
        if let Some(data) = self.find_existing_data(&name).await? {
            let decision = if options.is_dependency {
                DataDecision::Reuse
            } else {
                resolver.existing_data(&data)
            };
            info!(instance = %name, volumes = data.volumes.len(), ?decision, "Found existing data");
            match decision {
                DataDecision::Reuse => reused = data.environment.unwrap_or_default(),
                DataDecision::Delete => self.delete_existing_data(&data).await,
                DataDecision::Cancel => return Ok(InstallOutcome::Cancelled),
            }
        }

        let mut overrides = options.environment.clone();
        overrides.extend(reused);
        let plan = InstallPlan {
            options: &options,
            spec,
            name,
            version,
            overrides,
            exposed: options.expose.unwrap_or(spec.expose),
        };

        // Orders are checked before anything touches the runtime
        let init_order = multi::init_order(spec, &plan.name)?;
        if spec.is_multi_container() {
            multi::start_order(spec, &plan.name)?;
        }

        self.runtime.ensure_network(&self.settings.network).await?;
        self.run_init_containers(&plan, &init_order).await?;

        let instance = if spec.is_multi_container() {
            self.install_multi_container(&plan).await?
        } else {
            self.install_single_container(&plan).await?
        };

        if let Err(e) = self.state.save_env_snapshot(&instance.name, plan.snapshot()).await {
            warn_step("env_snapshot", format!("save environment of {}: {}", instance.name, e));
        }
        if instance.exposed {
            let hostname = self.hostname(&instance.name);
            if let Err(e) = self.registrar.register(&instance.name, &hostname).await {
                warn_step("dns", format!("register {}: {}", hostname, e));
            }
        }

        info!(instance = %instance.name, status = %instance.status, "Instance installed");
        Ok(InstallOutcome::Installed(instance))
    }

    /// Instance name for an install: explicit, else `<service>-<version>`,
    /// made unique with a numeric suffix when a new instance is requested.
    async fn instance_name(&self, options: &InstallOptions, version: &str) -> Result<String> {
        let name = match &options.instance_name {
            Some(name) => name.clone(),
            None => {
                let base = naming::default_instance_name(&options.service, version);
                if options.new_instance {
                    let existing: HashSet<String> =
                        self.state.instance_names().await?.into_iter().collect();
                    naming::unique_instance_name(&base, &existing)
                } else {
                    base
                }
            }
        };

        if !naming::is_valid_instance_name(&name) {
            return Err(BerthError::InvalidConfig {
                reason: format!("invalid instance name {:?}", name),
            });
        }
        Ok(name)
    }

    /// Volumes and stored environment left behind under `instance`.
    async fn find_existing_data(&self, instance: &str) -> Result<Option<ExistingData>> {
        let prefix = naming::volume_prefix(&self.settings.prefix, instance);
        let volumes = self.runtime.list_volumes(&prefix).await?;
        let others = self.state.instance_names().await?;
        let owned: Vec<String> =
            naming::owned_volumes(&self.settings.prefix, instance, &volumes, &others)
                .into_iter()
                .cloned()
                .collect();
        let environment = self.state.get_env_snapshot(instance).await?;

        if owned.is_empty() && environment.is_none() {
            return Ok(None);
        }
        Ok(Some(ExistingData { instance: instance.to_string(), volumes: owned, environment }))
    }

    async fn delete_existing_data(&self, data: &ExistingData) {
        for volume in &data.volumes {
            if let Err(e) = self.runtime.remove_volume(volume).await {
                warn_step("volume", format!("remove volume {}: {}", volume, e));
            }
        }
        if let Err(e) = self.state.delete_env_snapshot(&data.instance).await {
            warn_step("env_snapshot", format!("delete environment of {}: {}", data.instance, e));
        }
    }

    /// Named volume mounts for `instance`.
    pub(super) fn mounts<'v>(
        &self,
        instance: &str,
        volumes: impl IntoIterator<Item = &'v VolumeSpec>,
    ) -> Vec<Mount> {
        volumes
            .into_iter()
            .map(|v| Mount {
                volume: naming::volume_name(&self.settings.prefix, instance, &v.name),
                target: v.target.clone(),
            })
            .collect()
    }

    /// Create, connect and start the single container of `plan`. The record is
    /// written only after the container is confirmed running; any failure
    /// after creation removes the container again.
    #[instrument(skip(self, plan), fields(instance = %plan.name))]
    async fn install_single_container(&self, plan: &InstallPlan<'_>) -> Result<Instance> {
        let spec = plan.spec;
        let image = spec.image.as_deref().ok_or_else(|| {
            BerthError::invalid_spec(&plan.options.service, &plan.version, "spec has no image")
        })?;
        self.ensure_image(image).await?;

        let mut env = spec.environment.clone();
        env.extend(plan.overrides.clone());

        let full_name = naming::container_name(&self.settings.prefix, &plan.name);
        let request = ContainerRequest {
            name: full_name.clone(),
            image: image.to_string(),
            env,
            labels: container_labels(
                &self.settings,
                &plan.options.service,
                &plan.name,
                plan.exposure(),
            ),
            mounts: self.mounts(&plan.name, &spec.volumes),
            exposed_ports: spec.port.into_iter().collect(),
            resources: plan.options.resources.or(spec.resources),
            command: spec.command.clone(),
            network: None,
        };

        let id = self.runtime.create_container(&request).await?;

        let aliases = naming::single_container_aliases(&plan.options.service, &plan.name);
        let started: Result<Instance> = async {
            self.runtime.connect_network(&self.settings.network, &full_name, &aliases).await?;
            self.runtime.start_container(&id).await?;

            let state = self.runtime.inspect_container(&id).await?;
            if !state.is_running() {
                return Err(BerthError::ContainerNotRunning {
                    container: full_name.clone(),
                    status: state.status.to_string(),
                });
            }

            let instance = Instance {
                name: plan.name.clone(),
                service: plan.options.service.clone(),
                version: plan.version.clone(),
                status: InstanceStatus::Running,
                container_id: Some(id.clone()),
                containers: Vec::new(),
                port: spec.exposed_port(),
                exposed: plan.exposed,
                dependency: plan.options.is_dependency,
                created_at: SystemTime::now(),
            };
            self.state.insert_instance(&instance).await?;
            Ok(instance)
        }
        .await;

        match started {
            Ok(instance) => Ok(instance),
            Err(e) => {
                info!(container = %full_name, error = %e, "Install failed, removing container");
                metrics::record_rollback("single");
                self.discard_container(&full_name, &id).await;
                Err(e)
            }
        }
    }
}
