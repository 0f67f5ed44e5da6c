//! State management with SQLite persistence.
//!
//! The StateManager is the instance store:
//! - Instance records, keyed by instance name
//! - Environment snapshots of installed instances, used to reuse data on reinstall
//!
//! Every mutation of an existing record goes through [`StateManager::update_instance`],
//! which loads, mutates and saves inside one transaction.

use crate::error::{BerthError, Result};
use crate::types::{Instance, InstanceStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub mod migrations;


/// State manager for persistent storage.
#[derive(Clone)]
pub struct StateManager {
    pool: SqlitePool,
    /// Serializes read-modify-write cycles within this process
    write_lock: Arc<Mutex<()>>,
}

impl StateManager {
    /// Create a new StateManager with an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new StateManager with a database at the specified path.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Initializing state manager at {:?}", db_path);

        let in_memory = db_path == Path::new(":memory:");
        if !in_memory {
            if let Some(parent) = db_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BerthError::Io { path: parent.to_path_buf(), source: e })?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(db_path.to_str().ok_or_else(|| {
            BerthError::InvalidConfig { reason: "Invalid database path".to_string() }
        })?)
        .map_err(|e| BerthError::DatabaseError(e.to_string()))?;

        options = options.create_if_missing(true).log_statements(tracing::log::LevelFilter::Debug);

        // Each in-memory connection is its own database
        let pool_options = if in_memory {
            SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| BerthError::DatabaseError(e.to_string()))?;

        let manager = Self { pool, write_lock: Arc::new(Mutex::new(())) };
        manager.run_migrations().await?;

        info!("State manager initialized successfully");
        Ok(manager)
    }

    #[instrument(skip(self))]
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    // ========================
    // Instance Operations
    // ========================

    /// Insert a new instance. Fails if the name is taken.
    #[instrument(skip(self, instance), fields(instance = %instance.name))]
    pub async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let exists: Option<String> = sqlx::query_scalar("SELECT name FROM instances WHERE name = ?")
            .bind(&instance.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("insert_instance", e))?;
        if exists.is_some() {
            return Err(BerthError::InstanceExists { name: instance.name.clone() });
        }

        let record = encode_instance(instance)?;
        let now = unix_secs(SystemTime::now());

        sqlx::query(
            r#"
            INSERT INTO instances (name, service, version, status, record, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.name)
        .bind(&instance.service)
        .bind(&instance.version)
        .bind(instance.status.to_string())
        .bind(record)
        .bind(unix_secs(instance.created_at))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert_instance", e))?;

        Ok(())
    }

    /// Get an instance by name.
    #[instrument(skip(self))]
    pub async fn get_instance(&self, name: &str) -> Result<Instance> {
        self.find_instance(name)
            .await?
            .ok_or_else(|| BerthError::InstanceNotFound { name: name.to_string() })
    }

    /// Get an instance by name, `None` if it does not exist.
    #[instrument(skip(self))]
    pub async fn find_instance(&self, name: &str) -> Result<Option<Instance>> {
        let row = sqlx::query("SELECT record FROM instances WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get_instance", e))?;

        row.map(row_to_instance).transpose()
    }

    /// List all instances, oldest first.
    #[instrument(skip(self))]
    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        let rows = sqlx::query("SELECT record FROM instances ORDER BY created_at, name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list_instances", e))?;

        rows.into_iter().map(row_to_instance).collect()
    }

    /// Names of all instances.
    #[instrument(skip(self))]
    pub async fn instance_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM instances ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("instance_names", e))
    }

    /// Atomically load, mutate and save one instance.
    ///
    /// The mutator sees the latest stored record. Nothing is written if the
    /// instance does not exist.
    #[instrument(skip(self, mutate))]
    pub async fn update_instance<F>(&self, name: &str, mutate: F) -> Result<Instance>
    where
        F: FnOnce(&mut Instance) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| db_error("update_instance", e))?;

        let row = sqlx::query("SELECT record FROM instances WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("update_instance", e))?;
        let mut instance = match row {
            Some(row) => row_to_instance(row)?,
            None => return Err(BerthError::InstanceNotFound { name: name.to_string() }),
        };

        mutate(&mut instance);
        // The key is not mutable through this path
        instance.name = name.to_string();

        sqlx::query("UPDATE instances SET status = ?, record = ?, updated_at = ? WHERE name = ?")
            .bind(instance.status.to_string())
            .bind(encode_instance(&instance)?)
            .bind(unix_secs(SystemTime::now()))
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("update_instance", e))?;

        tx.commit().await.map_err(|e| db_error("update_instance", e))?;
        debug!(status = %instance.status, "Instance updated");
        Ok(instance)
    }

    /// Update instance status.
    #[instrument(skip(self))]
    pub async fn update_instance_status(
        &self,
        name: &str,
        status: InstanceStatus,
    ) -> Result<Instance> {
        self.update_instance(name, |instance| instance.status = status).await
    }

    /// Delete an instance. Deleting a missing instance is not an error.
    #[instrument(skip(self))]
    pub async fn delete_instance(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM instances WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete_instance", e))?;

        Ok(())
    }

    // ========================
    // Environment Snapshots
    // ========================

    /// Store the merged environment of an instance, replacing any previous one.
    #[instrument(skip(self, environment))]
    pub async fn save_env_snapshot(
        &self,
        instance: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<()> {
        let json = serde_json::to_string(environment).map_err(|e| {
            BerthError::DatabaseError(format!("Failed to serialize environment: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO env_snapshots (instance_name, environment, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(instance_name) DO UPDATE SET
                environment = excluded.environment,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(instance)
        .bind(json)
        .bind(unix_secs(SystemTime::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save_env_snapshot", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_env_snapshot(
        &self,
        instance: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT environment FROM env_snapshots WHERE instance_name = ?")
                .bind(instance)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("get_env_snapshot", e))?;

        json.map(|json| {
            serde_json::from_str(&json).map_err(|e| {
                BerthError::DatabaseError(format!("Failed to deserialize environment: {}", e))
            })
        })
        .transpose()
    }

    #[instrument(skip(self))]
    pub async fn delete_env_snapshot(&self, instance: &str) -> Result<()> {
        sqlx::query("DELETE FROM env_snapshots WHERE instance_name = ?")
            .bind(instance)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete_env_snapshot", e))?;

        Ok(())
    }
}

fn db_error(operation: &'static str, e: sqlx::Error) -> BerthError {
    metrics::counter!("berth_db_errors_total", "operation" => operation).increment(1);
    BerthError::DatabaseError(e.to_string())
}

fn encode_instance(instance: &Instance) -> Result<String> {
    serde_json::to_string(instance)
        .map_err(|e| BerthError::DatabaseError(format!("Failed to serialize instance: {}", e)))
}

fn row_to_instance(row: sqlx::sqlite::SqliteRow) -> Result<Instance> {
    let record: String = row.get("record");
    serde_json::from_str(&record)
        .map_err(|e| BerthError::DatabaseError(format!("Failed to deserialize instance: {}", e)))
}

fn unix_secs(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
