//! Container Lifecycle Manager
//!
//! Create/start/stop/remove/status an island, wait for it to become ready
//! with exponential backoff, and project engine inspect responses into the
//! metadata shapes callers need (ports, mounts, env, resources, uptime).

use crate::engine::{ContainerInfo, Engine};
use crate::errors::{CoderaftError, Result};
use crate::island::{island_name_for_project, Island, IslandState, ISLAND_NAME_PREFIX};
use crate::project_config::ProjectConfig;
use crate::retry::Backoff;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Metadata projection returned by [`ContainerManager::meta`].
#[derive(Debug, Clone, Default)]
pub struct ContainerMeta {
    /// Environment variables.
    pub env: IndexMap<String, String>,
    /// Working directory.
    pub working_dir: String,
    /// User.
    pub user: String,
    /// Restart policy name.
    pub restart_policy: String,
    /// Labels.
    pub labels: IndexMap<String, String>,
    /// Added Linux capabilities.
    pub cap_add: Vec<String>,
    /// CPU allotment, trimmed decimal string (`"2"`, `"0.5"`).
    pub cpus: String,
    /// Memory limit, MB, rounded.
    pub memory_mb: i64,
    /// Network mode.
    pub network_mode: String,
}

/// Manages the lifecycle of island containers.
pub struct ContainerManager<'a> {
    engine: &'a dyn Engine,
}

impl<'a> ContainerManager<'a> {
    /// Create a new manager over the given engine.
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self { engine }
    }

    /// Project `project_config` onto engine create-parameters and create the
    /// container. Returns the engine-assigned container id.
    #[instrument(skip(self, project_config))]
    pub async fn create(
        &self,
        name: &str,
        image: &str,
        workspace_host: &str,
        workspace_island: &str,
        project_config: Option<&ProjectConfig>,
    ) -> Result<String> {
        let mut island = Island {
            name: name.to_string(),
            image: image.to_string(),
            workspace_host: workspace_host.to_string(),
            workspace_island: workspace_island.to_string(),
            env: IndexMap::new(),
            labels: IndexMap::new(),
            resources: crate::island::Resources::default(),
            restart_policy: crate::island::DEFAULT_RESTART_POLICY.to_string(),
            mounts: Vec::new(),
            ports: Vec::new(),
            health: None,
            gpu: None,
            network_mode: "bridge".to_string(),
            cap_add: Vec::new(),
            working_dir: workspace_island.to_string(),
            user: None,
        };

        if let Some(config) = project_config {
            config.apply_to_island(&mut island);
        }

        self.engine.container_create(&island).await
    }

    /// Start a created container.
    pub async fn start(&self, id: &str) -> Result<()> {
        self.engine.container_start(id).await
    }

    /// Stop a container, clamping `timeout_sec` to `>= 0`.
    pub async fn stop(&self, name: &str, timeout_sec: i64) -> Result<()> {
        self.engine
            .container_stop(name, timeout_sec.max(0))
            .await
    }

    /// Force-remove a container.
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.engine.container_remove(name).await
    }

    /// Whether a container with this name exists.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.engine.container_inspect(name).await?.is_some())
    }

    /// Current status string; `"not found"` when no such container exists.
    pub async fn status(&self, name: &str) -> Result<&'static str> {
        match self.engine.container_inspect(name).await? {
            Some(info) => Ok(IslandState::from_engine_status(&info.status).as_status_str()),
            None => Ok(IslandState::NotFound.as_status_str()),
        }
    }

    /// Poll `status` with exponential backoff until `running` or `timeout`
    /// elapses.
    #[instrument(skip(self))]
    pub async fn wait_ready(&self, name: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut backoff = Backoff::default();
        let mut attempt: u32 = 0;

        loop {
            if self.status(name).await? == "running" {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(CoderaftError::ReadyTimeout {
                    name: name.to_string(),
                });
            }

            debug!(name, attempt, "island not ready yet, backing off");
            backoff.wait(attempt).await;
            attempt += 1;
        }
    }

    /// Enumerate all containers whose (leading-slash-stripped) name begins
    /// with `coderaft_`.
    pub async fn list(&self) -> Result<Vec<ContainerInfo>> {
        let all = self.engine.container_list(true).await?;
        Ok(all
            .into_iter()
            .filter(|c| c.name.starts_with(ISLAND_NAME_PREFIX))
            .collect())
    }

    /// Project a container's metadata.
    pub async fn meta(&self, name: &str) -> Result<ContainerMeta> {
        let info = self.inspect_or_not_found(name).await?;
        Ok(ContainerMeta {
            env: info.env,
            working_dir: info.working_dir,
            user: info.user,
            restart_policy: info.restart_policy,
            labels: info.labels,
            cap_add: info.cap_add,
            cpus: trim_cpus(info.nano_cpus),
            memory_mb: (info.memory_bytes as f64 / (1024.0 * 1024.0)).round() as i64,
            network_mode: info.network_mode,
        })
    }

    /// True iff the island has no published ports and at most one process.
    pub async fn idle(&self, name: &str) -> Result<bool> {
        let info = self.inspect_or_not_found(name).await?;
        Ok(info.port_mappings.is_empty() && info.pids <= 1)
    }

    /// Elapsed time since the container was started, parsing
    /// nanosecond-precision RFC 3339 with a fallback to second precision.
    pub async fn uptime(&self, name: &str) -> Result<Option<Duration>> {
        let info = self.inspect_or_not_found(name).await?;
        let Some(started_at) = info.started_at else {
            return Ok(None);
        };
        let Some(started) = parse_started_at(&started_at) else {
            return Ok(None);
        };
        let elapsed = Utc::now().signed_duration_since(started);
        Ok(elapsed.to_std().ok())
    }

    /// Flatten port bindings to `"cport/proto -> host_ip:host_port"`.
    pub async fn port_mappings(&self, name: &str) -> Result<Vec<String>> {
        let info = self.inspect_or_not_found(name).await?;
        Ok(info
            .port_mappings
            .into_iter()
            .map(|(binding, host_ip, host_port)| {
                format!(
                    "{}/{} -> {}:{}",
                    binding.container_port, binding.protocol, host_ip, host_port
                )
            })
            .collect())
    }

    async fn inspect_or_not_found(&self, name: &str) -> Result<ContainerInfo> {
        self.engine
            .container_inspect(name)
            .await?
            .ok_or_else(|| CoderaftError::ContainerNotFound {
                name: name.to_string(),
            })
    }
}

/// Derive the canonical island name for a project.
pub fn island_name(project: &str) -> String {
    island_name_for_project(project)
}

fn parse_started_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Format `nanos/1e9` trimmed of trailing zeros and a trailing dot.
fn trim_cpus(nano_cpus: i64) -> String {
    let cpus = nano_cpus as f64 / 1_000_000_000.0;
    let formatted = format!("{cpus:.3}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_cpus_removes_trailing_zeros() {
        assert_eq!(trim_cpus(2_000_000_000), "2");
        assert_eq!(trim_cpus(500_000_000), "0.5");
        assert_eq!(trim_cpus(1_250_000_000), "1.25");
        assert_eq!(trim_cpus(0), "0");
    }

    #[test]
    fn test_island_name_prefix() {
        assert_eq!(island_name("demo"), "coderaft_demo");
    }

    #[test]
    fn test_parse_started_at_nanosecond_precision() {
        let parsed = parse_started_at("2024-01-01T00:00:00.123456789Z");
        assert!(parsed.is_some());
    }

    #[test]
    fn test_parse_started_at_rejects_garbage() {
        assert!(parse_started_at("not-a-date").is_none());
    }
}
