//! Lifecycle of installed instances.
//!
//! Multi-container instances start in stored (creation) order and stop or
//! remove in reverse. Every public operation holds the instance's operation
//! lock for its whole duration; the `*_locked` helpers assume it is held.

use super::options::{RemoveOptions, RemoveReport};
use super::{best_effort, Orchestrator};
use crate::error::{BerthError, Result};
use crate::naming;
use crate::observability::metrics;
use crate::types::{aggregate_status, ContainerStatus, Instance};
use std::collections::HashMap;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// A managed container of an instance, in stored order.
struct Target {
    full_name: String,
    id: String,
}

impl Orchestrator {
    /// Start an installed instance.
    #[instrument(skip(self))]
    pub async fn start(&self, name: &str) -> Result<Instance> {
        let _guard = self.locks.acquire(name).await;
        metrics::record_lifecycle_op("start");

        let instance = self.state.get_instance(name).await?;
        self.start_locked(&instance).await?;
        self.refresh_locked(name).await
    }

    /// Stop an installed instance.
    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> Result<Instance> {
        let _guard = self.locks.acquire(name).await;
        metrics::record_lifecycle_op("stop");

        let instance = self.state.get_instance(name).await?;
        self.stop_locked(&instance).await?;
        self.refresh_locked(name).await
    }

    /// Restart an installed instance. Multi-container instances are fully
    /// stopped, then started again in order.
    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str) -> Result<Instance> {
        let _guard = self.locks.acquire(name).await;
        metrics::record_lifecycle_op("restart");

        let instance = self.state.get_instance(name).await?;
        if instance.is_multi_container() {
            self.stop_locked(&instance).await?;
            self.start_locked(&instance).await?;
        } else {
            let id = self.single_target(&instance).id;
            self.runtime.restart_container(&id, self.settings.stop_timeout).await?;
        }
        self.refresh_locked(name).await
    }

    /// Remove an instance: its containers, its volumes (unless kept) and its record.
    ///
    /// Stop, disconnect, volume and DNS failures are warnings. A container that
    /// cannot be removed fails the call and keeps the record, so the remove can
    /// be retried.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str, options: RemoveOptions) -> Result<RemoveReport> {
        let _guard = self.locks.acquire(name).await;
        metrics::record_lifecycle_op("remove");

        let instance = self.state.get_instance(name).await?;
        let report = self.remove_locked(&instance, options).await?;
        info!(warnings = report.warnings.len(), "Instance removed");
        Ok(report)
    }

    /// Inspect an instance's containers and store the resulting status.
    #[instrument(skip(self))]
    pub async fn status(&self, name: &str) -> Result<Instance> {
        let _guard = self.locks.acquire(name).await;
        self.refresh_locked(name).await
    }

    /// Refresh the status of every instance concurrently, one task per instance.
    ///
    /// An instance whose refresh fails is reported with its stored record.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<Vec<Instance>> {
        let names = self.state.instance_names().await?;

        let mut tasks = JoinSet::new();
        for name in names {
            let orchestrator = self.clone();
            tasks.spawn(async move {
                let result = orchestrator.status(&name).await;
                (name, result)
            });
        }

        let mut instances = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(instance))) => instances.push(instance),
                Ok((name, Err(BerthError::InstanceNotFound { .. }))) => {
                    debug!(instance = %name, "Instance removed during refresh");
                }
                Ok((name, Err(e))) => {
                    warn!(instance = %name, error = %e, "Status refresh failed");
                    if let Some(stored) = self.state.find_instance(&name).await? {
                        instances.push(stored);
                    }
                }
                Err(e) => warn!(error = %e, "Status refresh task failed"),
            }
        }

        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    /// Stored instances, without touching the runtime.
    pub async fn list(&self) -> Result<Vec<Instance>> {
        self.state.list_instances().await
    }

    async fn start_locked(&self, instance: &Instance) -> Result<()> {
        if !instance.is_multi_container() {
            let id = self.single_target(instance).id;
            return self.runtime.start_container(&id).await;
        }

        for (idx, container) in instance.containers.iter().enumerate() {
            if idx > 0 {
                self.settle().await;
            }
            debug!(container = %container.name, "Starting container");
            self.runtime.start_container(&container.id).await?;
            self.set_container_status(&instance.name, &container.id, ContainerStatus::Running)
                .await?;
        }
        Ok(())
    }

    async fn stop_locked(&self, instance: &Instance) -> Result<()> {
        if !instance.is_multi_container() {
            let id = self.single_target(instance).id;
            return self.runtime.stop_container(&id, self.settings.stop_timeout).await;
        }

        for container in instance.containers.iter().rev() {
            debug!(container = %container.name, "Stopping container");
            self.runtime.stop_container(&container.id, self.settings.stop_timeout).await?;
            self.set_container_status(&instance.name, &container.id, ContainerStatus::Stopped)
                .await?;
        }
        Ok(())
    }

    /// Tear down `instance` and delete its record. With `keep_volumes` the
    /// volumes and stored environment survive for a later reinstall.
    pub(super) async fn remove_locked(
        &self,
        instance: &Instance,
        options: RemoveOptions,
    ) -> Result<RemoveReport> {
        let mut report = RemoveReport { instance: instance.name.clone(), ..Default::default() };

        for target in self.targets(instance).iter().rev() {
            let stopped = self.runtime.stop_container(&target.id, self.settings.stop_timeout).await;
            if let Err(e) = stopped {
                let message = format!("stop {}: {}", target.full_name, e);
                best_effort(&mut report.warnings, "stop", message);
            }
            if let Err(e) =
                self.runtime.disconnect_network(&self.settings.network, &target.full_name).await
            {
                best_effort(
                    &mut report.warnings,
                    "network",
                    format!("disconnect {}: {}", target.full_name, e),
                );
            }
            self.runtime.remove_container(&target.id, true).await?;
            report.removed_containers += 1;
        }

        if !options.keep_volumes {
            self.remove_volumes(&instance.name, &mut report).await;
            if let Err(e) = self.state.delete_env_snapshot(&instance.name).await {
                let message = format!("delete environment of {}: {}", instance.name, e);
                best_effort(&mut report.warnings, "env_snapshot", message);
            }
        }

        if let Err(e) = self.registrar.unregister(&instance.name).await {
            let message = format!("unregister {}: {}", instance.name, e);
            best_effort(&mut report.warnings, "dns", message);
        }

        self.state.delete_instance(&instance.name).await?;
        Ok(report)
    }

    /// Remove the instance's own volumes. Only names under the managed prefix
    /// are considered, and volumes of instances whose names extend this one
    /// are left alone.
    async fn remove_volumes(&self, instance: &str, report: &mut RemoveReport) {
        let prefix = naming::volume_prefix(&self.settings.prefix, instance);
        let volumes = match self.runtime.list_volumes(&prefix).await {
            Ok(volumes) => volumes,
            Err(e) => {
                best_effort(&mut report.warnings, "volume", format!("list volumes: {}", e));
                return;
            }
        };
        let others = match self.state.instance_names().await {
            Ok(names) => names,
            Err(e) => {
                best_effort(&mut report.warnings, "volume", format!("list instances: {}", e));
                return;
            }
        };

        for volume in naming::owned_volumes(&self.settings.prefix, instance, &volumes, &others) {
            match self.runtime.remove_volume(volume).await {
                Ok(()) => report.removed_volumes.push(volume.clone()),
                Err(e) => best_effort(
                    &mut report.warnings,
                    "volume",
                    format!("remove volume {}: {}", volume, e),
                ),
            }
        }
    }

    /// Inspect every container of `name` and write the aggregated status back.
    async fn refresh_locked(&self, name: &str) -> Result<Instance> {
        let instance = self.state.get_instance(name).await?;

        let mut observed: HashMap<String, ContainerStatus> = HashMap::new();
        for target in self.targets(&instance) {
            let status = match self.runtime.inspect_container(&target.id).await {
                Ok(state) => state.container_status(),
                Err(e) => {
                    warn!(container = %target.full_name, error = %e, "Inspect failed");
                    ContainerStatus::Unknown
                }
            };
            observed.insert(target.id, status);
        }

        self.state
            .update_instance(name, move |stored| {
                let statuses: Vec<ContainerStatus> = if stored.is_multi_container() {
                    for container in &mut stored.containers {
                        let status = observed.get(&container.id).copied();
                        container.status = status.unwrap_or(ContainerStatus::Unknown);
                    }
                    stored.containers.iter().map(|c| c.status).collect()
                } else {
                    observed.values().copied().collect()
                };
                stored.status = aggregate_status(&statuses);
            })
            .await
    }

    async fn set_container_status(
        &self,
        name: &str,
        id: &str,
        status: ContainerStatus,
    ) -> Result<()> {
        let id = id.to_string();
        self.state
            .update_instance(name, move |stored| {
                if let Some(container) = stored.containers.iter_mut().find(|c| c.id == id) {
                    container.status = status;
                }
            })
            .await
            .map(|_| ())
    }

    /// Containers of `instance` in stored order.
    fn targets(&self, instance: &Instance) -> Vec<Target> {
        if instance.is_multi_container() {
            instance
                .containers
                .iter()
                .map(|c| Target { full_name: c.full_name.clone(), id: c.id.clone() })
                .collect()
        } else {
            vec![self.single_target(instance)]
        }
    }

    /// The container of a single-container instance. Falls back to the runtime
    /// name when no ID was recorded.
    fn single_target(&self, instance: &Instance) -> Target {
        let full_name = naming::container_name(&self.settings.prefix, &instance.name);
        let id = instance.container_id.clone().unwrap_or_else(|| full_name.clone());
        Target { full_name, id }
    }
}
