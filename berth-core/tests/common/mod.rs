//! Shared fixtures for orchestrator integration tests.
//!
//! `MockRuntime` keeps containers, volumes and images in memory and records
//! every call so tests can assert on ordering. Failures are injected per
//! operation and container name.

#![allow(dead_code)]

use async_trait::async_trait;
use berth_core::error::{BerthError, Result};
use berth_core::runtime::{ContainerRequest, ContainerState, RunOutput, RuntimeStatus};
use berth_core::{
    Catalog, ContainerRuntime, NoopRegistrar, Orchestrator, OrchestratorSettings,
    ServiceRegistrar, StateManager,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    status: RuntimeStatus,
}

#[derive(Default)]
struct Inner {
    calls: Vec<String>,
    requests: Vec<ContainerRequest>,
    containers: HashMap<String, MockContainer>,
    volumes: Vec<String>,
    images: HashSet<String>,
    failures: HashSet<(String, String)>,
    exits_on_start: HashSet<String>,
    init_results: HashMap<String, (i64, String)>,
    aliases: HashMap<String, Vec<String>>,
}

/// In-memory container runtime.
#[derive(Default)]
pub struct MockRuntime {
    inner: Mutex<Inner>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `op` fail for the container (or volume) called `name`.
    pub fn fail_on(&self, op: &str, name: &str) {
        self.inner.lock().unwrap().failures.insert((op.to_string(), name.to_string()));
    }

    /// Container `name` exits right after it is started.
    pub fn exit_on_start(&self, name: &str) {
        self.inner.lock().unwrap().exits_on_start.insert(name.to_string());
    }

    /// Result of running the init container called `name`.
    pub fn init_result(&self, name: &str, exit_code: i64, logs: &str) {
        self.inner.lock().unwrap().init_results.insert(name.to_string(), (exit_code, logs.to_string()));
    }

    /// Force the observed status of container `name`.
    pub fn set_status(&self, name: &str, status: RuntimeStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(container) = inner.containers.values_mut().find(|c| c.name == name) {
            container.status = status;
        }
    }

    pub fn add_volume(&self, name: &str) {
        self.inner.lock().unwrap().volumes.push(name.to_string());
    }

    pub fn volumes(&self) -> Vec<String> {
        self.inner.lock().unwrap().volumes.clone()
    }

    /// Recorded calls, formatted `<op>:<container name>`.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Recorded calls of one operation, as container names.
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        let prefix = format!("{}:", op);
        self.calls().into_iter().filter_map(|c| c.strip_prefix(&prefix).map(String::from)).collect()
    }

    pub fn requests(&self) -> Vec<ContainerRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn request(&self, name: &str) -> Option<ContainerRequest> {
        self.requests().into_iter().find(|r| r.name == name)
    }

    /// Most recent request for `name`, for reinstalls.
    pub fn last_request(&self, name: &str) -> Option<ContainerRequest> {
        self.requests().into_iter().rev().find(|r| r.name == name)
    }

    pub fn aliases(&self, name: &str) -> Vec<String> {
        self.inner.lock().unwrap().aliases.get(name).cloned().unwrap_or_default()
    }

    /// Names of containers that currently exist.
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.inner.lock().unwrap().containers.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    /// Record `op` against `name`, failing if a failure was injected.
    fn record(&self, op: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("{}:{}", op, name));
        if inner.failures.contains(&(op.to_string(), name.to_string())) {
            return Err(BerthError::runtime(op, name, "injected failure"));
        }
        Ok(())
    }

    fn name_of(&self, id: &str) -> String {
        let inner = self.inner.lock().unwrap();
        inner.containers.get(id).map(|c| c.name.clone()).unwrap_or_else(|| id.to_string())
    }
}

fn container_id(name: &str) -> String {
    format!("cid-{}", name)
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_container(&self, request: &ContainerRequest) -> Result<String> {
        self.record("create", &request.name)?;
        let mut inner = self.inner.lock().unwrap();
        let id = container_id(&request.name);
        if inner.containers.contains_key(&id) {
            return Err(BerthError::runtime("create", &request.name, "name already in use"));
        }
        for mount in &request.mounts {
            if !inner.volumes.contains(&mount.volume) {
                inner.volumes.push(mount.volume.clone());
            }
        }
        inner.requests.push(request.clone());
        inner.containers.insert(
            id.clone(),
            MockContainer { name: request.name.clone(), status: RuntimeStatus::Created },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let name = self.name_of(id);
        self.record("start", &name)?;
        let mut inner = self.inner.lock().unwrap();
        let exits = inner.exits_on_start.contains(&name);
        match inner.containers.get_mut(id) {
            Some(container) => {
                container.status = if exits { RuntimeStatus::Exited } else { RuntimeStatus::Running };
                Ok(())
            }
            None => Err(BerthError::runtime("start", name, "no such container")),
        }
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<()> {
        let name = self.name_of(id);
        self.record("stop", &name)?;
        if let Some(container) = self.inner.lock().unwrap().containers.get_mut(id) {
            container.status = RuntimeStatus::Exited;
        }
        Ok(())
    }

    async fn restart_container(&self, id: &str, _timeout: Duration) -> Result<()> {
        let name = self.name_of(id);
        self.record("restart", &name)?;
        if let Some(container) = self.inner.lock().unwrap().containers.get_mut(id) {
            container.status = RuntimeStatus::Running;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<()> {
        let name = self.name_of(id);
        self.record("remove", &name)?;
        self.inner.lock().unwrap().containers.remove(id);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerState> {
        let inner = self.inner.lock().unwrap();
        Ok(match inner.containers.get(id) {
            Some(container) => ContainerState {
                status: container.status,
                exit_code: None,
                oom_killed: false,
                health: None,
            },
            None => ContainerState::missing(),
        })
    }

    async fn list_containers(&self, _selector: &str) -> Result<Vec<String>> {
        Ok(self.inner.lock().unwrap().containers.keys().cloned().collect())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record("pull", image)?;
        self.inner.lock().unwrap().images.insert(image.to_string());
        Ok(())
    }

    async fn ensure_network(&self, network: &str) -> Result<()> {
        self.record("network", network)
    }

    async fn connect_network(&self, _network: &str, container: &str, aliases: &[String]) -> Result<()> {
        self.record("connect", container)?;
        self.inner.lock().unwrap().aliases.insert(container.to_string(), aliases.to_vec());
        Ok(())
    }

    async fn disconnect_network(&self, _network: &str, container: &str) -> Result<()> {
        self.record("disconnect", container)
    }

    async fn list_volumes(&self, prefix: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.volumes.iter().filter(|v| v.starts_with(prefix)).cloned().collect())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.record("remove-volume", name)?;
        self.inner.lock().unwrap().volumes.retain(|v| v != name);
        Ok(())
    }

    async fn run_to_completion(&self, request: &ContainerRequest, _timeout: Duration) -> Result<RunOutput> {
        self.record("run", &request.name)?;
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request.clone());
        let (exit_code, logs) =
            inner.init_results.get(&request.name).cloned().unwrap_or((0, String::new()));
        Ok(RunOutput { exit_code, logs })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Registrar that remembers registrations and can be told to fail.
#[derive(Default)]
pub struct RecordingRegistrar {
    pub fail: bool,
    pub hosts: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl ServiceRegistrar for RecordingRegistrar {
    async fn register(&self, instance: &str, hostname: &str) -> Result<()> {
        if self.fail {
            return Err(BerthError::InvalidConfig { reason: "hosts file is read-only".to_string() });
        }
        self.hosts.lock().unwrap().insert(instance.to_string(), hostname.to_string());
        Ok(())
    }

    async fn unregister(&self, instance: &str) -> Result<()> {
        self.hosts.lock().unwrap().remove(instance);
        Ok(())
    }
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings { settle_delay: Duration::ZERO, ..Default::default() }
}

pub struct Fixture {
    pub orchestrator: Orchestrator,
    pub runtime: Arc<MockRuntime>,
    pub state: Arc<StateManager>,
}

/// Orchestrator over the builtin catalog, an in-memory store and `registrar`.
pub async fn fixture_with(registrar: Arc<dyn ServiceRegistrar>) -> Fixture {
    build_fixture(Catalog::builtin(), registrar).await
}

/// Orchestrator over a YAML catalog.
pub async fn fixture_with_catalog(yaml: &str) -> Fixture {
    build_fixture(Catalog::from_yaml(yaml).unwrap(), Arc::new(NoopRegistrar)).await
}

async fn build_fixture(catalog: Catalog, registrar: Arc<dyn ServiceRegistrar>) -> Fixture {
    let runtime = MockRuntime::new();
    let state = Arc::new(StateManager::new_in_memory().await.unwrap());
    let orchestrator = Orchestrator::new(
        Arc::new(catalog),
        state.clone(),
        runtime.clone(),
        registrar,
        test_settings(),
    );
    Fixture { orchestrator, runtime, state }
}

pub async fn fixture() -> Fixture {
    fixture_with(Arc::new(NoopRegistrar)).await
}
