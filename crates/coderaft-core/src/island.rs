//! Island identity and state
//!
//! An island is the long-lived per-project development container. This
//! module holds its identity, desired-state parameters, and the status
//! enum the container lifecycle manager projects from an engine inspect.

use crate::errors::{CoderaftError, Result};
use crate::gpu::GpuRequest;
use crate::mount::Mount;
use crate::ports::PortBinding;
use indexmap::IndexMap;
use std::time::Duration;

/// Prefix every island name must carry.
pub const ISLAND_NAME_PREFIX: &str = "coderaft_";

/// `/tmp` tmpfs size applied to every island, per the container invariant.
pub const TMPFS_SIZE_BYTES: u64 = 256 * 1024 * 1024;

/// Shared-memory size applied to every island.
pub const SHM_SIZE_BYTES: u64 = 256 * 1024 * 1024;

/// Default restart policy for a freshly created island.
pub const DEFAULT_RESTART_POLICY: &str = "unless-stopped";

/// Validate and return an island name. Names MUST be prefixed `coderaft_`
/// and non-empty beyond the prefix.
pub fn validate_island_name(name: &str) -> Result<String> {
    if !name.starts_with(ISLAND_NAME_PREFIX) || name.len() <= ISLAND_NAME_PREFIX.len() {
        return Err(CoderaftError::InvalidProjectName {
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}

/// Build the canonical island name for a project.
pub fn island_name_for_project(project: &str) -> String {
    format!("{ISLAND_NAME_PREFIX}{project}")
}

/// CPU/memory resource request, in engine-native units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resources {
    /// CPU allotment in nanoseconds-per-second (`cpus * 1e9`).
    pub nano_cpus: i64,
    /// Memory limit in bytes.
    pub memory_bytes: i64,
}

/// Health-check parameters projected from `health_check.*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheck {
    /// Command to run inside the container.
    pub test: Vec<String>,
    /// Interval between checks.
    pub interval: Option<Duration>,
    /// Per-check timeout.
    pub timeout: Option<Duration>,
    /// Consecutive failures before unhealthy.
    pub retries: Option<u32>,
}

/// Desired-state parameters for creating an island.
#[derive(Debug, Clone)]
pub struct Island {
    /// Unique island name, prefixed `coderaft_`.
    pub name: String,
    /// Image reference to instantiate.
    pub image: String,
    /// Host-side workspace path.
    pub workspace_host: String,
    /// Island-side workspace mount point (default `/island`).
    pub workspace_island: String,
    /// Environment variables.
    pub env: IndexMap<String, String>,
    /// Labels attached to the container.
    pub labels: IndexMap<String, String>,
    /// CPU/memory resource request.
    pub resources: Resources,
    /// Restart policy name.
    pub restart_policy: String,
    /// Additional bind mounts (volumes + dotfiles).
    pub mounts: Vec<Mount>,
    /// Published ports.
    pub ports: Vec<PortBinding>,
    /// Optional health check.
    pub health: Option<HealthCheck>,
    /// Optional GPU device request.
    pub gpu: Option<GpuRequest>,
    /// Network mode (default `bridge`).
    pub network_mode: String,
    /// Added Linux capabilities.
    pub cap_add: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: String,
    /// User to run as.
    pub user: Option<String>,
}

impl Island {
    /// Labels with the fixed `coderaft.project` entry merged in, used both
    /// to tag the container and as an engine list filter.
    pub fn labels_with_project(&self, project: &str) -> IndexMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert("coderaft.project".to_string(), project.to_string());
        labels
    }
}

/// Status of an island as projected from an engine inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IslandState {
    /// No container with this name exists.
    NotFound,
    /// Created but never started.
    Created,
    /// Currently running.
    Running,
    /// Ran and stopped.
    Exited,
    /// Paused.
    Paused,
    /// Dead (engine-reported terminal failure state).
    Dead,
}

impl IslandState {
    /// Parse the engine's `State.Status` string.
    pub fn from_engine_status(status: &str) -> Self {
        match status {
            "created" => IslandState::Created,
            "running" => IslandState::Running,
            "exited" => IslandState::Exited,
            "paused" => IslandState::Paused,
            "dead" => IslandState::Dead,
            _ => IslandState::NotFound,
        }
    }

    /// The literal status string surfaced to callers, matching
    /// `status(name)`'s not-found contract.
    pub fn as_status_str(&self) -> &'static str {
        match self {
            IslandState::NotFound => "not found",
            IslandState::Created => "created",
            IslandState::Running => "running",
            IslandState::Exited => "exited",
            IslandState::Paused => "paused",
            IslandState::Dead => "dead",
        }
    }
}
