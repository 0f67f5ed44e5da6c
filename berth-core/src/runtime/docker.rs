//! Docker runtime driven through the `docker` CLI.

use super::{ContainerRequest, ContainerRuntime, ContainerState, RunOutput, RuntimeStatus};
use crate::error::{BerthError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// `docker` CLI adapter.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

/// Subset of `docker inspect --format '{{json .State}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    exit_code: i64,
    #[serde(default, rename = "OOMKilled")]
    oom_killed: bool,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

/// Captured output of one CLI invocation.
struct CliOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl DockerCli {
    /// Adapter using `docker` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    async fn exec(&self, args: &[String]) -> Result<CliOutput> {
        debug!(args = ?args, "docker");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BerthError::runtime("exec", self.binary.display().to_string(), e.to_string())
            })?;

        Ok(CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a command that must succeed; returns trimmed stdout.
    async fn run(&self, operation: &str, target: &str, args: Vec<String>) -> Result<String> {
        let output = self.exec(&args).await?;
        if !output.success {
            return Err(BerthError::runtime(operation, target, output.stderr));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Like `run`, but "no such ..." errors count as success.
    async fn run_idempotent(&self, operation: &str, target: &str, args: Vec<String>) -> Result<()> {
        let output = self.exec(&args).await?;
        if output.success || is_not_found(&output.stderr) {
            return Ok(());
        }
        Err(BerthError::runtime(operation, target, output.stderr))
    }

    fn create_args(request: &ContainerRequest) -> Vec<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), request.name.clone()];

        if let Some(network) = &request.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for (key, value) in &request.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in &request.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        for mount in &request.mounts {
            args.push("-v".to_string());
            args.push(format!("{}:{}", mount.volume, mount.target));
        }
        for port in &request.exposed_ports {
            args.push("--expose".to_string());
            args.push(port.to_string());
        }
        if let Some(memory) = request.resources.memory_mb {
            args.push("--memory".to_string());
            args.push(format!("{}m", memory));
        }
        if let Some(cpus) = request.resources.cpus {
            args.push("--cpus".to_string());
            args.push(cpus.to_string());
        }

        args.push(request.image.clone());
        args.extend(request.command.iter().cloned());
        args
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such container")
        || stderr.contains("no such volume")
        || stderr.contains("no such object")
        || stderr.contains("not found")
        || stderr.contains("is not connected")
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[instrument(skip(self, request), fields(container = %request.name, image = %request.image))]
    async fn create_container(&self, request: &ContainerRequest) -> Result<String> {
        let id = self.run("create", &request.name, Self::create_args(request)).await?;
        info!(id = %id, "Container created");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn start_container(&self, id: &str) -> Result<()> {
        self.run("start", id, args(&["start", id])).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.run_idempotent("stop", id, args(&["stop", "--time", secs.as_str(), id])).await
    }

    #[instrument(skip(self))]
    async fn restart_container(&self, id: &str, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.run("restart", id, args(&["restart", "--time", secs.as_str(), id])).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut cmd = args(&["rm"]);
        if force {
            cmd.push("--force".to_string());
        }
        cmd.push(id.to_string());
        self.run_idempotent("remove", id, cmd).await
    }

    #[instrument(skip(self))]
    async fn inspect_container(&self, id: &str) -> Result<ContainerState> {
        let output = self
            .exec(&args(&["inspect", "--type", "container", "--format", "{{json .State}}", id]))
            .await?;
        if !output.success {
            if is_not_found(&output.stderr) {
                return Ok(ContainerState::missing());
            }
            return Err(BerthError::runtime("inspect", id, output.stderr));
        }

        let state: InspectState = serde_json::from_str(output.stdout.trim())
            .map_err(|e| BerthError::runtime("inspect", id, format!("unexpected output: {}", e)))?;
        let status = RuntimeStatus::parse(&state.status).ok_or_else(|| {
            BerthError::runtime("inspect", id, format!("unknown status {}", state.status))
        })?;

        Ok(ContainerState {
            status,
            exit_code: Some(state.exit_code),
            oom_killed: state.oom_killed,
            health: state.health.map(|h| h.status),
        })
    }

    #[instrument(skip(self))]
    async fn list_containers(&self, selector: &str) -> Result<Vec<String>> {
        let filter = format!("label={}", selector);
        let cmd = args(&["ps", "-a", "--filter", filter.as_str(), "--format", "{{.Names}}"]);
        let stdout = self.run("list", selector, cmd).await?;
        Ok(stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }

    #[instrument(skip(self))]
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let output = self.exec(&args(&["image", "inspect", "--format", "{{.Id}}", image])).await?;
        Ok(output.success)
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image");
        let start = Instant::now();
        let output = self.exec(&args(&["pull", image])).await?;
        if !output.success {
            return Err(BerthError::ImagePullFailed {
                image: image.to_string(),
                reason: output.stderr,
            });
        }
        info!(duration_ms = start.elapsed().as_millis(), "Image pulled");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_network(&self, network: &str) -> Result<()> {
        let output = self.exec(&args(&["network", "inspect", network])).await?;
        if output.success {
            return Ok(());
        }
        info!("Creating network");
        self.run("network create", network, args(&["network", "create", network])).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: &[String],
    ) -> Result<()> {
        let mut cmd = args(&["network", "connect"]);
        for alias in aliases {
            cmd.push("--alias".to_string());
            cmd.push(alias.clone());
        }
        cmd.push(network.to_string());
        cmd.push(container.to_string());

        let output = self.exec(&cmd).await?;
        if output.success || output.stderr.contains("already exists") {
            return Ok(());
        }
        Err(BerthError::runtime("network connect", container, output.stderr))
    }

    #[instrument(skip(self))]
    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()> {
        self.run_idempotent(
            "network disconnect",
            container,
            args(&["network", "disconnect", network, container]),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_volumes(&self, prefix: &str) -> Result<Vec<String>> {
        let filter = format!("name={}", prefix);
        let cmd = args(&["volume", "ls", "--filter", filter.as_str(), "--format", "{{.Name}}"]);
        let stdout = self.run("volume list", prefix, cmd).await?;
        // The name filter matches substrings
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|name| name.starts_with(prefix))
            .map(String::from)
            .collect())
    }

    #[instrument(skip(self))]
    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.run_idempotent("volume remove", name, args(&["volume", "rm", name])).await
    }

    #[instrument(skip(self, request), fields(container = %request.name))]
    async fn run_to_completion(
        &self,
        request: &ContainerRequest,
        timeout: Duration,
    ) -> Result<RunOutput> {
        // Leftover from an interrupted run
        self.remove_container(&request.name, true).await?;

        let id = self.create_container(request).await?;
        if let Err(e) = self.start_container(&id).await {
            if let Err(cleanup) = self.remove_container(&id, true).await {
                warn!(error = %cleanup, "Failed to remove init container that did not start");
            }
            return Err(e);
        }

        let wait = self.run("wait", &request.name, args(&["wait", id.as_str()]));
        let exit_code = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(stdout)) => stdout.parse::<i64>().map_err(|e| {
                let reason = format!("unexpected exit code {:?}: {}", stdout, e);
                BerthError::runtime("wait", &request.name, reason)
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BerthError::InitContainerTimeout {
                name: request.name.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        };

        let logs = match self.exec(&args(&["logs", id.as_str()])).await {
            Ok(output) => format!("{}{}", output.stdout, output.stderr),
            Err(e) => {
                warn!(error = %e, "Failed to collect container logs");
                String::new()
            }
        };

        if let Err(e) = self.remove_container(&id, true).await {
            warn!(error = %e, "Failed to remove finished container");
        }

        Ok(RunOutput { exit_code: exit_code?, logs })
    }

    fn name(&self) -> &str {
        "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Mount;
    use crate::types::ResourceLimits;

    #[test]
    fn test_create_args() {
        let request = ContainerRequest {
            name: "berth-cache-7".to_string(),
            image: "redis:7-alpine".to_string(),
            env: [("A".to_string(), "1".to_string())].into_iter().collect(),
            labels: [("berth.instance".to_string(), "cache-7".to_string())].into_iter().collect(),
            mounts: vec![Mount { volume: "berth-cache-7-data".to_string(), target: "/data".to_string() }],
            exposed_ports: vec![6379],
            resources: ResourceLimits { memory_mb: Some(256), cpus: Some(0.5) },
            command: vec!["redis-server".to_string()],
            network: Some("berth".to_string()),
        };

        let args = DockerCli::create_args(&request);
        assert_eq!(
            args,
            vec![
                "create", "--name", "berth-cache-7", "--network", "berth", "-e", "A=1", "--label",
                "berth.instance=cache-7", "-v", "berth-cache-7-data:/data", "--expose", "6379",
                "--memory", "256m", "--cpus", "0.5", "redis:7-alpine", "redis-server",
            ]
        );
    }

    #[test]
    fn test_inspect_state_parsing() {
        let json = r#"{"Status":"exited","Running":false,"OOMKilled":true,"ExitCode":137,"Health":{"Status":"unhealthy"}}"#;
        let state: InspectState = serde_json::from_str(json).unwrap();
        assert_eq!(state.status, "exited");
        assert_eq!(state.exit_code, 137);
        assert!(state.oom_killed);
        assert_eq!(state.health.unwrap().status, "unhealthy");
    }

    /// Fake `docker` whose `start` and removal by id fail. Every call is
    /// appended to `calls.log` next to the script.
    #[cfg(unix)]
    fn failing_start_docker(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{}"
case "$1" in
  create) echo cid-init ;;
  start) echo "port is already allocated" >&2; exit 1 ;;
  rm) if [ "$3" = "cid-init" ]; then echo "removal already in progress" >&2; exit 1; fi ;;
esac
"#,
            log.display()
        );
        let path = dir.join("docker");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_to_completion_keeps_start_error_when_cleanup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let docker = DockerCli::with_binary(failing_start_docker(dir.path()));
        let request = ContainerRequest {
            name: "berth-metabase-0.50-init-create-db".to_string(),
            image: "postgres:16-alpine".to_string(),
            ..Default::default()
        };

        let err = docker.run_to_completion(&request, Duration::from_secs(5)).await.unwrap_err();

        assert!(matches!(err, BerthError::Runtime { ref operation, .. } if operation == "start"));
        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(
            calls,
            vec![
                "rm --force berth-metabase-0.50-init-create-db",
                "create --name berth-metabase-0.50-init-create-db postgres:16-alpine",
                "start cid-init",
                "rm --force cid-init",
            ]
        );
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Error response from daemon: No such container: berth-x"));
        assert!(is_not_found("Error: No such volume: berth-x-data"));
        assert!(!is_not_found("permission denied"));
    }
}
