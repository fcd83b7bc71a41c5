//! Process-wide read-only configuration
//!
//! Timeouts and worker-pool sizes are read once from the environment into a
//! read-only value object. Components receive `&Tunables` rather than
//! re-reading the environment ad hoc (no ambient global mutable state).

use std::env;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_STOP_TIMEOUT_SECS: i64 = 2;
const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_SETUP_WORKERS: usize = 3;
const DEFAULT_QUERY_WORKERS: usize = 5;

/// Process-wide tunables, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    /// Default `container_stop` timeout, clamped to `>= 0`.
    pub stop_timeout: Duration,
    /// When true, the setup executor and package-query executor run
    /// everything sequentially.
    pub disable_parallel: bool,
    /// Maximum concurrent tasks for a generic worker pool batch.
    pub max_workers: usize,
    /// Per-category concurrency cap for the setup executor.
    pub setup_workers: usize,
    /// Concurrency cap for the package-query executor.
    pub query_workers: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS as u64),
            disable_parallel: false,
            max_workers: DEFAULT_MAX_WORKERS,
            setup_workers: DEFAULT_SETUP_WORKERS,
            query_workers: DEFAULT_QUERY_WORKERS,
        }
    }
}

impl Tunables {
    /// Read tunables from the environment, falling back to defaults for any
    /// variable that is absent or fails to parse.
    #[instrument]
    pub fn from_env() -> Self {
        let stop_timeout_secs = env::var("CODERAFT_STOP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_STOP_TIMEOUT_SECS)
            .max(0);

        let disable_parallel = env::var("CODERAFT_DISABLE_PARALLEL")
            .map(|v| v == "true")
            .unwrap_or(false);

        let max_workers = positive_usize("CODERAFT_MAX_WORKERS", DEFAULT_MAX_WORKERS);
        let setup_workers = positive_usize("CODERAFT_SETUP_WORKERS", DEFAULT_SETUP_WORKERS);
        let query_workers = positive_usize("CODERAFT_QUERY_WORKERS", DEFAULT_QUERY_WORKERS);

        let tunables = Self {
            stop_timeout: Duration::from_secs(stop_timeout_secs as u64),
            disable_parallel,
            max_workers,
            setup_workers,
            query_workers,
        };
        debug!(?tunables, "loaded tunables from environment");
        tunables
    }
}

fn positive_usize(var: &str, default: usize) -> usize {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tunables() {
        let t = Tunables::default();
        assert_eq!(t.stop_timeout, Duration::from_secs(2));
        assert!(!t.disable_parallel);
        assert_eq!(t.max_workers, 4);
        assert_eq!(t.setup_workers, 3);
        assert_eq!(t.query_workers, 5);
    }

    #[test]
    fn test_positive_usize_rejects_zero_and_garbage() {
        std::env::remove_var("CODERAFT_MAX_WORKERS_TEST");
        assert_eq!(positive_usize("CODERAFT_MAX_WORKERS_TEST", 7), 7);
    }
}
