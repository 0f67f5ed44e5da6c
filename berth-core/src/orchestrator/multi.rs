//! Multi-container installs.
//!
//! Order of work:
//! 1. init containers run to completion, in dependency order (any spec)
//! 2. service containers are created in declared order
//! 3. service containers start in `depends_on` order
//!
//! Any failure in 2 or 3 removes every container created so far.

use super::install::InstallPlan;
use super::Orchestrator;
use crate::error::{BerthError, Result};
use crate::labels::container_labels;
use crate::naming;
use crate::observability::metrics;
use crate::runtime::ContainerRequest;
use crate::topo::topological_order;
use crate::types::{
    ContainerInfo, ContainerSpec, ContainerStatus, Instance, InstanceStatus, ServiceSpec,
};
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};

/// Start order of a spec's containers, as indices into `spec.containers`.
///
/// Only `depends_on` entries naming sibling containers count; other names refer
/// to services the dependency pre-pass already installed.
pub(crate) fn start_order(spec: &ServiceSpec, instance: &str) -> Result<Vec<usize>> {
    let nodes: Vec<(&str, Vec<&str>)> = spec
        .containers
        .iter()
        .map(|c| (c.name.as_str(), c.depends_on.iter().map(String::as_str).collect()))
        .collect();

    topological_order(&nodes).map_err(|container| BerthError::ContainerCycle {
        instance: instance.to_string(),
        container,
    })
}

/// Run order of a spec's init containers, as indices into `spec.init_containers`.
pub(crate) fn init_order(spec: &ServiceSpec, instance: &str) -> Result<Vec<usize>> {
    let nodes: Vec<(&str, Vec<&str>)> = spec
        .init_containers
        .iter()
        .map(|c| (c.name.as_str(), c.depends_on.iter().map(String::as_str).collect()))
        .collect();

    topological_order(&nodes).map_err(|container| BerthError::InitContainerCycle {
        instance: instance.to_string(),
        container,
    })
}

impl Orchestrator {
    #[instrument(skip(self, plan), fields(instance = %plan.name))]
    pub(super) async fn install_multi_container(&self, plan: &InstallPlan<'_>) -> Result<Instance> {
        let start_order = start_order(plan.spec, &plan.name)?;

        let mut created: Vec<ContainerInfo> = Vec::with_capacity(plan.spec.containers.len());
        let result = self.create_and_start(plan, &start_order, &mut created).await;

        match result {
            Ok(instance) => Ok(instance),
            Err(e) => {
                warn!(
                    error = %e,
                    created = created.len(),
                    "Multi-container install failed, rolling back"
                );
                metrics::record_rollback("multi");
                self.rollback(&created).await;
                Err(e)
            }
        }
    }

    /// Run every init container to completion, stopping at the first non-zero
    /// exit. Each run removes its own container.
    pub(super) async fn run_init_containers(
        &self,
        plan: &InstallPlan<'_>,
        order: &[usize],
    ) -> Result<()> {
        for &idx in order {
            let init = &plan.spec.init_containers[idx];
            info!(init = %init.name, "Running init container");
            self.ensure_image(&init.image).await?;

            let mut env = plan.spec.environment.clone();
            env.extend(init.environment.clone());
            env.extend(plan.overrides.clone());

            let request = ContainerRequest {
                name: naming::init_container_name(&self.settings.prefix, &plan.name, &init.name),
                image: init.image.clone(),
                env,
                labels: container_labels(&self.settings, &plan.options.service, &plan.name, None),
                mounts: self.mounts(&plan.name, &init.volumes),
                command: init.command.clone(),
                network: Some(self.settings.network.clone()),
                ..Default::default()
            };

            let output =
                self.runtime.run_to_completion(&request, self.settings.init_timeout).await?;
            if !output.success() {
                return Err(BerthError::InitContainerFailed {
                    name: init.name.clone(),
                    exit_code: output.exit_code,
                    logs: output.logs,
                });
            }
            debug!(init = %init.name, "Init container finished");
        }
        Ok(())
    }

    /// Create all containers in declared order, then start them in `start_order`.
    /// Every created container is pushed to `created` before anything else
    /// happens to it.
    async fn create_and_start(
        &self,
        plan: &InstallPlan<'_>,
        start_order: &[usize],
        created: &mut Vec<ContainerInfo>,
    ) -> Result<Instance> {
        let spec = plan.spec;
        let primary = spec.primary_index();

        for (idx, container) in spec.containers.iter().enumerate() {
            let is_primary = primary == Some(idx);
            let full_name =
                naming::multi_container_name(&self.settings.prefix, &plan.name, &container.name);
            self.ensure_image(&container.image).await?;

            let request = self.member_request(plan, container, &full_name, is_primary);
            let id = self.runtime.create_container(&request).await?;
            created.push(ContainerInfo {
                name: container.name.clone(),
                id,
                full_name: full_name.clone(),
                primary: is_primary,
                status: ContainerStatus::Created,
                image: container.image.clone(),
            });

            let aliases = naming::multi_container_aliases(
                &self.settings.prefix,
                &plan.options.service,
                &plan.name,
                &container.name,
                is_primary,
            );
            self.runtime.connect_network(&self.settings.network, &full_name, &aliases).await?;
            debug!(container = %container.name, "Container created");
        }

        for (n, &idx) in start_order.iter().enumerate() {
            if n > 0 {
                self.settle().await;
            }
            let info = &created[idx];
            info!(container = %info.name, "Starting container");
            self.runtime.start_container(&info.id).await?;

            let state = self.runtime.inspect_container(&info.id).await?;
            if !state.is_running() {
                return Err(BerthError::ContainerNotRunning {
                    container: info.full_name.clone(),
                    status: state.status.to_string(),
                });
            }
            created[idx].status = ContainerStatus::Running;
        }

        let instance = Instance {
            name: plan.name.clone(),
            service: plan.options.service.clone(),
            version: plan.version.clone(),
            status: InstanceStatus::Running,
            container_id: None,
            containers: created.clone(),
            port: spec.exposed_port(),
            exposed: plan.exposed,
            dependency: plan.options.is_dependency,
            created_at: SystemTime::now(),
        };
        self.state.insert_instance(&instance).await?;
        Ok(instance)
    }

    fn member_request(
        &self,
        plan: &InstallPlan<'_>,
        container: &ContainerSpec,
        full_name: &str,
        is_primary: bool,
    ) -> ContainerRequest {
        let spec = plan.spec;

        let mut env = spec.environment.clone();
        env.extend(container.environment.clone());
        env.extend(plan.overrides.clone());

        let exposure = if is_primary { plan.exposure() } else { None };

        ContainerRequest {
            name: full_name.to_string(),
            image: container.image.clone(),
            env,
            labels: container_labels(&self.settings, &plan.options.service, &plan.name, exposure),
            mounts: self.mounts(&plan.name, spec.volumes.iter().chain(&container.volumes)),
            exposed_ports: container.ports.clone(),
            resources: plan.options.resources.or(container.resources.or(spec.resources)),
            command: container.command.clone(),
            network: None,
        }
    }

    /// Disconnect and remove every recorded container. Failures are logged.
    async fn rollback(&self, created: &[ContainerInfo]) {
        for info in created {
            self.discard_container(&info.full_name, &info.id).await;
        }
    }
}
