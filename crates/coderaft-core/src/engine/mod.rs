//! Engine Adapter
//!
//! A thin capability surface over the container engine daemon. The trait
//! shape follows the teacher's own `Docker` trait; the concrete
//! implementation talks to the daemon's HTTP API directly (see
//! [`bollard_engine`]) rather than shelling out to a CLI binary, since this
//! adapter needs multiplexed exec streams, single-sample stats, and raw
//! image save/load byte streams.

pub mod bollard_engine;
pub mod projection;
pub mod stats;

pub use bollard_engine::BollardEngine;
pub use stats::ContainerStatsSummary;

use crate::errors::Result;
use crate::island::Island;
use crate::mount::Mount;
use crate::ports::PortBinding;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use indexmap::IndexMap;

/// Output of a non-streamed exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i64,
}

impl ExecResult {
    /// True when the command exited successfully.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Projected view of a container's inspect response.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    /// Engine container id.
    pub id: String,
    /// Container name, with any leading `/` stripped.
    pub name: String,
    /// Image reference/ID the container was created from.
    pub image: String,
    /// Raw `State.Status` string.
    pub status: String,
    /// `State.StartedAt`, RFC 3339.
    pub started_at: Option<String>,
    /// `NetworkSettings.Ports`, flattened.
    pub port_mappings: Vec<(PortBinding, String, u16)>,
    /// `Mounts[]`.
    pub mounts: Vec<Mount>,
    /// `Config.Env`, split on first `=`.
    pub env: IndexMap<String, String>,
    /// `Config.WorkingDir`.
    pub working_dir: String,
    /// `Config.User`.
    pub user: String,
    /// `Config.Labels`.
    pub labels: IndexMap<String, String>,
    /// `HostConfig.NanoCPUs`.
    pub nano_cpus: i64,
    /// `HostConfig.Memory`, bytes.
    pub memory_bytes: i64,
    /// `HostConfig.RestartPolicy.Name`.
    pub restart_policy: String,
    /// `HostConfig.CapAdd`.
    pub cap_add: Vec<String>,
    /// `HostConfig.NetworkMode`.
    pub network_mode: String,
    /// Current PID count (from stats, when available).
    pub pids: u64,
}

/// Progress event from an image pull, as surfaced to the caller.
#[derive(Debug, Clone)]
pub enum PullProgress {
    /// A layered progress status line.
    Status(String),
    /// The daemon reported an error; the pull is aborted.
    Error(String),
}

/// Thin capability surface over the container engine daemon.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Check daemon reachability.
    async fn ping(&self) -> Result<()>;

    /// Whether an image matching `reference` exists locally.
    async fn image_exists(&self, reference: &str) -> Result<bool>;

    /// List the repo:tag references of images whose repository starts with
    /// `repository_prefix`.
    async fn image_list(&self, repository_prefix: &str) -> Result<Vec<String>>;

    /// Remove an image by reference.
    async fn image_remove(&self, reference: &str) -> Result<()>;

    /// Pull an image, yielding progress events; aborts on the first error.
    async fn image_pull(&self, reference: &str) -> Result<BoxStream<'static, PullProgress>>;

    /// Stream an image as a tar archive.
    async fn image_save(&self, reference: &str) -> Result<BoxStream<'static, Result<Bytes>>>;

    /// Load an image from a tar archive stream, returning its ID.
    async fn image_load(&self, archive: Vec<u8>) -> Result<String>;

    /// Build an image from a tar build context, with inline caching enabled.
    async fn image_build(
        &self,
        context: Vec<u8>,
        dockerfile_name: &str,
        tag: &str,
        env: &IndexMap<String, String>,
    ) -> Result<()>;

    /// Create a container from a desired-state [`Island`], returning its id.
    async fn container_create(&self, island: &Island) -> Result<String>;

    /// Start a container.
    async fn container_start(&self, id: &str) -> Result<()>;

    /// Stop a container, clamping `timeout_sec` to `>= 0`.
    async fn container_stop(&self, id: &str, timeout_sec: i64) -> Result<()>;

    /// Force-remove a container.
    async fn container_remove(&self, id: &str) -> Result<()>;

    /// Inspect a container; `Ok(None)` when it does not exist.
    async fn container_inspect(&self, id_or_name: &str) -> Result<Option<ContainerInfo>>;

    /// List containers, optionally including stopped ones.
    async fn container_list(&self, all: bool) -> Result<Vec<ContainerInfo>>;

    /// Run `argv` inside the container, attaching multiplexed stdout/stderr.
    /// When `show_output` is true, output is also forwarded to the host
    /// terminal as it arrives.
    async fn exec(&self, id: &str, argv: &[String], show_output: bool) -> Result<ExecResult>;

    /// Decode a single stats sample.
    async fn stats(&self, id: &str) -> Result<ContainerStatsSummary>;

    /// Commit a container to a new image, returning its ID.
    async fn commit(&self, id: &str, tag: &str) -> Result<String>;
}
