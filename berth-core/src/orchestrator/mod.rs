//! Service orchestration.
//!
//! The orchestrator turns catalog specs into running container instances and
//! manages them afterwards:
//! - `install`: dependency pre-pass, conflict handling, single-container install
//! - `multi`: init containers, ordered start and rollback for multi-container specs
//! - `lifecycle`: start, stop, restart, remove and status of installed instances
//!
//! Steps within one call are strictly sequential. Calls against different
//! instances may run concurrently; calls against the same instance are
//! serialized by a per-instance operation lock.

use crate::catalog::Catalog;
use crate::config::OrchestratorSettings;
use crate::error::Result;
use crate::observability::metrics;
use crate::registrar::ServiceRegistrar;
use crate::runtime::ContainerRuntime;
use crate::state::StateManager;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

mod install;
mod lifecycle;
mod multi;
pub mod options;

pub use options::{
    ConflictResolver, DataDecision, ExistingData, FixedResolver, InstallOptions, InstallOutcome,
    RemoveOptions, RemoveReport,
};

/// Service orchestrator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    state: Arc<StateManager>,
    runtime: Arc<dyn ContainerRuntime>,
    registrar: Arc<dyn ServiceRegistrar>,
    settings: Arc<OrchestratorSettings>,
    locks: Arc<InstanceLocks>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    /// * `catalog` - Service definitions
    /// * `state` - Instance store
    /// * `runtime` - Container runtime
    /// * `registrar` - Hostname registrar for exposed instances
    /// * `settings` - Naming prefix, network, proxy and timing knobs
    pub fn new(
        catalog: Arc<Catalog>,
        state: Arc<StateManager>,
        runtime: Arc<dyn ContainerRuntime>,
        registrar: Arc<dyn ServiceRegistrar>,
        settings: OrchestratorSettings,
    ) -> Self {
        info!(runtime = runtime.name(), prefix = %settings.prefix, "Orchestrator initialized");
        Self {
            catalog,
            state,
            runtime,
            registrar,
            settings: Arc::new(settings),
            locks: Arc::new(InstanceLocks::default()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Pull `image` unless it is already cached.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.runtime.image_exists(image).await? {
            return Ok(());
        }
        info!(image, "Image not cached, pulling");
        self.runtime.pull_image(image).await
    }

    /// Pause between consecutive container starts.
    async fn settle(&self) {
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }
    }

    /// Disconnect and force-remove one container, logging failures.
    async fn discard_container(&self, full_name: &str, id: &str) {
        if let Err(e) = self.runtime.disconnect_network(&self.settings.network, full_name).await {
            warn_step("cleanup", format!("disconnect {}: {}", full_name, e));
        }
        if let Err(e) = self.runtime.remove_container(id, true).await {
            warn_step("cleanup", format!("remove {}: {}", full_name, e));
        }
    }

    /// Hostname the proxy routes to an exposed instance.
    fn hostname(&self, instance: &str) -> String {
        format!("{}.{}", instance, self.settings.domain)
    }
}

/// Log and count a failed best-effort step.
fn warn_step(kind: &'static str, message: String) {
    warn!(kind, "{}", message);
    metrics::record_warning(kind);
}

/// Like [`warn_step`], and remember the warning for the caller.
fn best_effort(warnings: &mut Vec<String>, kind: &'static str, message: String) {
    warn_step(kind, message.clone());
    warnings.push(message);
}

/// Per-instance operation locks.
#[derive(Default)]
struct InstanceLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InstanceLocks {
    /// Wait for exclusive access to `instance`.
    async fn acquire(&self, instance: &str) -> InstanceGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(instance.to_string()).or_default().clone()
        };
        InstanceGuard {
            locks: self,
            instance: instance.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Forget `instance`'s lock once nobody holds or waits for it. Clones are
    /// only taken under the map lock, so a count of one cannot grow here.
    fn prune(&self, instance: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(instance).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(instance);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of one operation on an instance.
struct InstanceGuard<'a> {
    locks: &'a InstanceLocks,
    instance: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        // Release first so the guard's own reference is gone
        self.guard.take();
        self.locks.prune(&self.instance);
    }
}
