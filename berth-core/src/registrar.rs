//! Hostname registration for installed instances.
//!
//! After an install succeeds the orchestrator registers `<instance>.<domain>`
//! so the reverse proxy route resolves locally. Registration is best-effort:
//! the orchestrator logs failures and carries on.

use crate::error::{BerthError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

const BLOCK_BEGIN: &str = "# BEGIN berth";
const BLOCK_END: &str = "# END berth";

/// Hostname registrar trait.
#[async_trait]
pub trait ServiceRegistrar: Send + Sync {
    async fn register(&self, instance: &str, hostname: &str) -> Result<()>;

    async fn unregister(&self, instance: &str) -> Result<()>;
}

/// Registrar that does nothing.
#[derive(Debug, Default, Clone)]
pub struct NoopRegistrar;

#[async_trait]
impl ServiceRegistrar for NoopRegistrar {
    async fn register(&self, _instance: &str, _hostname: &str) -> Result<()> {
        Ok(())
    }

    async fn unregister(&self, _instance: &str) -> Result<()> {
        Ok(())
    }
}

/// Keeps one `127.0.0.1 <hostname>` line per instance inside a marked block
/// of a hosts file. Lines outside the block are never touched.
#[derive(Debug)]
pub struct HostsFileRegistrar {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HostsFileRegistrar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(BerthError::Io { path: self.path.clone(), source: e }),
        }
    }

    async fn write(&self, content: String) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BerthError::Io { path: parent.to_path_buf(), source: e })?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| BerthError::Io { path: self.path.clone(), source: e })
    }

    /// Rewrite the managed block, applying `edit` to its entries.
    async fn edit<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<(String, String)>) + Send,
    {
        let _guard = self.lock.lock().await;
        let content = self.read().await?;
        let (before, mut entries, after) = split_block(&content);
        edit(&mut entries);
        self.write(render(&before, &entries, &after)).await
    }
}

#[async_trait]
impl ServiceRegistrar for HostsFileRegistrar {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn register(&self, instance: &str, hostname: &str) -> Result<()> {
        let instance = instance.to_string();
        let hostname = hostname.to_string();
        self.edit(move |entries| {
            entries.retain(|(i, _)| *i != instance);
            entries.push((instance, hostname));
        })
        .await?;
        debug!("Hostname registered");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn unregister(&self, instance: &str) -> Result<()> {
        let instance = instance.to_string();
        self.edit(move |entries| entries.retain(|(i, _)| *i != instance)).await?;
        debug!("Hostname unregistered");
        Ok(())
    }
}

/// Split a hosts file into (text before the block, block entries, text after).
/// Entries are `(instance, hostname)`.
fn split_block(content: &str) -> (Vec<String>, Vec<(String, String)>, Vec<String>) {
    let mut before = Vec::new();
    let mut entries = Vec::new();
    let mut after = Vec::new();
    let mut section = 0;

    for line in content.lines() {
        match (section, line.trim()) {
            (0, BLOCK_BEGIN) => section = 1,
            (1, BLOCK_END) => section = 2,
            (0, _) => before.push(line.to_string()),
            (1, entry) => {
                // 127.0.0.1 <hostname> # <instance>
                let (addr_host, instance) = entry.split_once('#').unwrap_or((entry, ""));
                if let Some(hostname) = addr_host.split_whitespace().nth(1) {
                    entries.push((instance.trim().to_string(), hostname.to_string()));
                }
            }
            _ => after.push(line.to_string()),
        }
    }
    (before, entries, after)
}

fn render(before: &[String], entries: &[(String, String)], after: &[String]) -> String {
    let mut lines: Vec<String> = before.to_vec();
    if !entries.is_empty() {
        lines.push(BLOCK_BEGIN.to_string());
        for (instance, hostname) in entries {
            lines.push(format!("127.0.0.1 {} # {}", hostname, instance));
        }
        lines.push(BLOCK_END.to_string());
    }
    lines.extend(after.iter().cloned());

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        tokio::fs::write(&path, "127.0.0.1 localhost\n").await.unwrap();

        let registrar = HostsFileRegistrar::new(&path);
        registrar.register("cache-7", "cache-7.localhost").await.unwrap();
        registrar.register("pg", "pg.localhost").await.unwrap();
        registrar.register("cache-7", "cache-7.localhost").await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.starts_with("127.0.0.1 localhost\n"));
        assert_eq!(content.matches("cache-7.localhost").count(), 1);
        assert!(content.contains("127.0.0.1 pg.localhost # pg"));

        registrar.unregister("cache-7").await.unwrap();
        registrar.unregister("pg").await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "127.0.0.1 localhost\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = HostsFileRegistrar::new(dir.path().join("sub").join("hosts"));
        registrar.register("a", "a.test").await.unwrap();

        let content = tokio::fs::read_to_string(registrar.path()).await.unwrap();
        assert_eq!(content, "# BEGIN berth\n127.0.0.1 a.test # a\n# END berth\n");
    }

    #[test]
    fn test_split_block_preserves_surroundings() {
        let content = "a\n# BEGIN berth\n127.0.0.1 x.test # x\n# END berth\nb\n";
        let (before, entries, after) = split_block(content);
        assert_eq!(before, vec!["a"]);
        assert_eq!(entries, vec![("x".to_string(), "x.test".to_string())]);
        assert_eq!(after, vec!["b"]);
        assert_eq!(render(&before, &entries, &after), content);
    }
}
