//! Wiring shared by every command: configuration, catalog and orchestrator.

use anyhow::{Context as _, Result};
use berth_core::{
    init_observability, Catalog, Config, DockerCli, HostsFileRegistrar, Orchestrator,
    StateManager,
};
use std::sync::Arc;
use tracing::debug;

pub struct Context {
    pub config: Config,
    pub catalog: Arc<Catalog>,
}

impl Context {
    /// Load configuration, set up logging and build the catalog.
    pub fn load() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;

        if let Err(e) = init_observability(&config.log_level) {
            eprintln!("warning: logging disabled: {}", e);
        }

        let mut catalog = Catalog::builtin();
        if let Some(path) = &config.catalog_path {
            let overlay = Catalog::load_file(path)
                .with_context(|| format!("Failed to load catalog from {}", path))?;
            catalog = catalog.merge(overlay);
        }
        debug!(services = catalog.len(), "Catalog loaded");

        Ok(Self { config, catalog: Arc::new(catalog) })
    }

    /// Open the instance store and build an orchestrator over the Docker CLI.
    pub async fn orchestrator(&self) -> Result<Orchestrator> {
        let db_path = self.config.db_path();
        let state = StateManager::new(&db_path)
            .await
            .with_context(|| format!("Failed to open state database {}", db_path.display()))?;

        Ok(Orchestrator::new(
            self.catalog.clone(),
            Arc::new(state),
            Arc::new(DockerCli::new()),
            Arc::new(HostsFileRegistrar::new(self.config.hosts_file_path())),
            self.config.settings(),
        ))
    }
}
