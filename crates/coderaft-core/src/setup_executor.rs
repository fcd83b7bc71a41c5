//! Setup Executor
//!
//! Categorizes declared setup commands, plans them into fixed-order groups,
//! and applies each group inside the island: System and APT sequentially
//! (APT commands never run concurrently, to avoid dpkg lock contention),
//! the package-manager groups each internally parallel via the worker pool.

use crate::engine::Engine;
use crate::errors::{CoderaftError, Result};
use crate::tunables::Tunables;
use crate::worker_pool::{Task, TaskError, WorkerPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Per-category command classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// `systemctl|service|update-alternatives|adduser|usermod`.
    System,
    /// `apt|apt-get`.
    Apt,
    /// `pip|pip3`.
    Python,
    /// `npm`.
    Npm,
    /// `yarn`.
    Yarn,
    /// `pnpm`.
    Pnpm,
    /// Anything else.
    Other,
}

const SYSTEM_PREFIXES: &[&str] = &[
    "systemctl",
    "service",
    "update-alternatives",
    "adduser",
    "usermod",
];
const APT_PREFIXES: &[&str] = &["apt", "apt-get"];
const PYTHON_PREFIXES: &[&str] = &["pip", "pip3"];

/// Classify a command by the first whitespace-delimited token,
/// case-insensitively.
pub fn categorize(command: &str) -> Category {
    let first_token = command
        .trim()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    if SYSTEM_PREFIXES.contains(&first_token.as_str()) {
        Category::System
    } else if APT_PREFIXES.contains(&first_token.as_str()) {
        Category::Apt
    } else if PYTHON_PREFIXES.contains(&first_token.as_str()) {
        Category::Python
    } else if first_token == "npm" {
        Category::Npm
    } else if first_token == "yarn" {
        Category::Yarn
    } else if first_token == "pnpm" {
        Category::Pnpm
    } else {
        Category::Other
    }
}

/// Timeout applied to each login-shell exec, sequential or parallel.
const APPLY_TIMEOUT: Duration = Duration::from_secs(300);
/// Commands-per-exec chunk size for sequential groups.
const SEQUENTIAL_CHUNK_SIZE: usize = 10;

/// Applies declared setup commands inside an island.
pub struct SetupExecutor {
    engine: Arc<dyn Engine>,
    tunables: Tunables,
}

impl SetupExecutor {
    /// Create a new executor over the given engine and tunables.
    pub fn new(engine: Arc<dyn Engine>, tunables: Tunables) -> Self {
        Self { engine, tunables }
    }

    /// Categorize, plan, and apply `commands` inside the container `id`,
    /// per the fixed group order. Sequential groups abort the remaining
    /// plan on the first non-zero exit; parallel groups fall back to a
    /// chunked sequential retry on failure before aborting.
    #[instrument(skip(self, commands))]
    pub async fn execute_parallel(&self, id: &str, commands: &[String]) -> Result<()> {
        let mut system = Vec::new();
        let mut apt = Vec::new();
        let mut python = Vec::new();
        let mut npm = Vec::new();
        let mut yarn = Vec::new();
        let mut pnpm = Vec::new();
        let mut other = Vec::new();

        for command in commands {
            match categorize(command) {
                Category::System => system.push(command.clone()),
                Category::Apt => apt.push(command.clone()),
                Category::Python => python.push(command.clone()),
                Category::Npm => npm.push(command.clone()),
                Category::Yarn => yarn.push(command.clone()),
                Category::Pnpm => pnpm.push(command.clone()),
                Category::Other => other.push(command.clone()),
            }
        }

        self.run_sequential(id, &system).await?;
        self.run_sequential(id, &apt).await?;
        self.run_parallel_with_fallback(id, &python).await?;
        self.run_parallel_with_fallback(id, &npm).await?;
        self.run_parallel_with_fallback(id, &yarn).await?;
        self.run_parallel_with_fallback(id, &pnpm).await?;
        self.run_sequential(id, &other).await?;

        Ok(())
    }

    /// Primary sequential path: one `A.exec` call per command, in order,
    /// aborting the plan on the first non-zero exit.
    async fn run_sequential(&self, id: &str, commands: &[String]) -> Result<()> {
        for command in commands {
            exec_one(&self.engine, id, command).await?;
        }
        Ok(())
    }

    /// Run each command in `commands` under the category's worker cap. On
    /// failure, falls back to the chunked sequential recipe rather than
    /// aborting immediately; a failure of the fallback itself is fatal.
    async fn run_parallel_with_fallback(&self, id: &str, commands: &[String]) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.run_parallel(id, commands).await {
            warn!(error = %e, "parallel setup group failed, falling back to sequential chunks");
            return self.run_sequential_fallback(id, commands).await;
        }
        Ok(())
    }

    /// Run each command in `commands` through the worker pool under the
    /// category's worker cap, returning the first failure encountered. When
    /// `CODERAFT_DISABLE_PARALLEL` is set, the pool runs with a concurrency
    /// of 1 instead (same commands, same category, no actual fan-out).
    async fn run_parallel(&self, id: &str, commands: &[String]) -> Result<()> {
        let concurrency = if self.tunables.disable_parallel {
            1
        } else {
            self.tunables.setup_workers.max(1)
        };

        let tasks: Vec<Task<()>> = commands
            .iter()
            .map(|command| {
                let engine = self.engine.clone();
                let id = id.to_string();
                let command = command.clone();
                Box::pin(async move {
                    exec_one(&engine, &id, &command)
                        .await
                        .map_err(|e| TaskError(e.to_string()))
                }) as Task<()>
            })
            .collect();

        let pool = WorkerPool::new(concurrency, APPLY_TIMEOUT);
        for outcome in pool.execute_batch(tasks).await {
            outcome.map_err(|e| CoderaftError::ExecFailed {
                exit_code: -1,
                stderr: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Fallback recipe: chunk `commands` into batches of 10 joined with
    /// `; ` under `set -e`, run in order.
    async fn run_sequential_fallback(&self, id: &str, commands: &[String]) -> Result<()> {
        for chunk in commands.chunks(SEQUENTIAL_CHUNK_SIZE) {
            let script = format!("set -e; {}", chunk.join("; "));
            exec_one(&self.engine, id, &script).await?;
        }
        Ok(())
    }
}

/// Execute one login-shell script, returning its failure as a plan abort
/// on non-zero exit. Free function so it can be boxed into a `'static`
/// worker-pool task without borrowing from the executor.
async fn exec_one(engine: &Arc<dyn Engine>, id: &str, script: &str) -> Result<()> {
    let wrapped = format!(". /root/.bashrc >/dev/null 2>&1 || true; {script}");
    let argv = vec!["bash".to_string(), "-lc".to_string(), wrapped];

    let result = tokio::time::timeout(APPLY_TIMEOUT, engine.exec(id, &argv, false))
        .await
        .map_err(|_| CoderaftError::ExecFailed {
            exit_code: -1,
            stderr: "setup command timed out".to_string(),
        })??;

    if result.exit_code != 0 {
        warn!(exit_code = result.exit_code, "setup command failed, aborting plan");
        return Err(CoderaftError::ExecFailed {
            exit_code: result.exit_code,
            stderr: result.stderr,
        });
    }

    debug!("setup command applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_apt_variants() {
        assert_eq!(categorize("apt install git"), Category::Apt);
        assert_eq!(categorize("APT-GET update"), Category::Apt);
    }

    #[test]
    fn test_categorize_package_managers() {
        assert_eq!(categorize("pip install requests"), Category::Python);
        assert_eq!(categorize("npm install"), Category::Npm);
        assert_eq!(categorize("yarn add left-pad"), Category::Yarn);
        assert_eq!(categorize("pnpm add left-pad"), Category::Pnpm);
    }

    #[test]
    fn test_categorize_system_prefixes() {
        assert_eq!(categorize("systemctl restart foo"), Category::System);
        assert_eq!(categorize("usermod -aG docker dev"), Category::System);
    }

    #[test]
    fn test_categorize_defaults_to_other() {
        assert_eq!(categorize("echo hi"), Category::Other);
    }

    #[test]
    fn test_sequential_chunking_groups_of_ten() {
        let commands: Vec<String> = (0..15).map(|i| format!("echo {i}")).collect();
        let chunks: Vec<&[String]> = commands.chunks(SEQUENTIAL_CHUNK_SIZE).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 5);
    }
}
