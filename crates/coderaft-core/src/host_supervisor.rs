//! Host Engine Supervisor
//!
//! Detects whether the container engine daemon is reachable, and if not,
//! tries to start it using the host's native mechanism before polling for
//! readiness.

use crate::engine::Engine;
use crate::errors::{CoderaftError, Result};
use crate::platform::Platform;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Poll cadence while waiting for the daemon to come up.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Ensure the container engine daemon is reachable within `timeout`,
/// starting it via the platform's native mechanism if necessary.
#[instrument(skip(engine))]
pub async fn ensure_engine_running(engine: &dyn Engine, timeout: Duration) -> Result<()> {
    if engine.ping().await.is_ok() {
        return Ok(());
    }

    if !desktop_engine_process_running().await {
        start_engine(Platform::detect()).await?;
    }

    poll_until_ready(engine, timeout).await
}

async fn poll_until_ready(engine: &dyn Engine, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if engine.ping().await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CoderaftError::EngineStartupTimeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Platform-specific check for whether the desktop engine's process is
/// already running (but not yet answering the API, e.g. still warming up).
async fn desktop_engine_process_running() -> bool {
    match Platform::detect() {
        Platform::Windows => process_running("Docker Desktop.exe").await,
        Platform::MacOS => process_running("Docker Desktop").await,
        Platform::Linux | Platform::WSL => systemd_unit_active("docker").await,
    }
}

async fn process_running(name: &str) -> bool {
    let output = if cfg!(windows) {
        Command::new("tasklist").output().await
    } else {
        Command::new("pgrep").arg("-f").arg(name).output().await
    };

    match output {
        Ok(out) => {
            if cfg!(windows) {
                String::from_utf8_lossy(&out.stdout).contains(name)
            } else {
                out.status.success()
            }
        }
        Err(_) => false,
    }
}

async fn systemd_unit_active(unit: &str) -> bool {
    Command::new("systemctl")
        .arg("is-active")
        .arg("--quiet")
        .arg(unit)
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Attempt to start the daemon using the platform's native mechanism.
async fn start_engine(platform: Platform) -> Result<()> {
    info!(?platform, "starting container engine");

    let spawn_result = match platform {
        Platform::Windows => Command::new("cmd")
            .args(["/C", "start", "", "Docker Desktop.exe"])
            .spawn(),
        Platform::MacOS => Command::new("open").args(["-g", "-a", "Docker"]).spawn(),
        Platform::Linux | Platform::WSL => {
            if systemd_unit_active("docker").await {
                Command::new("systemctl").args(["start", "docker"]).spawn()
            } else {
                return Err(CoderaftError::EngineUnavailable {
                    message:
                        "the docker systemd unit is not active; start the container engine manually"
                            .to_string(),
                });
            }
        }
    };

    match spawn_result {
        Ok(mut child) => {
            let _ = child.wait().await;
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "failed to spawn container engine start command");
            Err(CoderaftError::EngineUnavailable {
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContainerInfo, ExecResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::BoxStream;
    use indexmap::IndexMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        ping_calls: Arc<AtomicUsize>,
        succeed_after: usize,
    }

    #[async_trait]
    impl Engine for CountingEngine {
        async fn ping(&self) -> Result<()> {
            let count = self.ping_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= self.succeed_after {
                Ok(())
            } else {
                Err(CoderaftError::EngineUnavailable {
                    message: "not ready".to_string(),
                })
            }
        }
        async fn image_exists(&self, _reference: &str) -> Result<bool> {
            Ok(false)
        }
        async fn image_list(&self, _repository_prefix: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn image_remove(&self, _reference: &str) -> Result<()> {
            Ok(())
        }
        async fn image_pull(
            &self,
            _reference: &str,
        ) -> Result<BoxStream<'static, crate::engine::PullProgress>> {
            unimplemented!()
        }
        async fn image_save(&self, _reference: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
            unimplemented!()
        }
        async fn image_load(&self, _archive: Vec<u8>) -> Result<String> {
            unimplemented!()
        }
        async fn image_build(
            &self,
            _context: Vec<u8>,
            _dockerfile_name: &str,
            _tag: &str,
            _env: &IndexMap<String, String>,
        ) -> Result<()> {
            unimplemented!()
        }
        async fn container_create(&self, _island: &crate::island::Island) -> Result<String> {
            unimplemented!()
        }
        async fn container_start(&self, _id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn container_stop(&self, _id: &str, _timeout_sec: i64) -> Result<()> {
            unimplemented!()
        }
        async fn container_remove(&self, _id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn container_inspect(&self, _id_or_name: &str) -> Result<Option<ContainerInfo>> {
            unimplemented!()
        }
        async fn container_list(&self, _all: bool) -> Result<Vec<ContainerInfo>> {
            unimplemented!()
        }
        async fn exec(&self, _id: &str, _argv: &[String], _show_output: bool) -> Result<ExecResult> {
            unimplemented!()
        }
        async fn stats(&self, _id: &str) -> Result<crate::engine::ContainerStatsSummary> {
            unimplemented!()
        }
        async fn commit(&self, _id: &str, _tag: &str) -> Result<String> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_ensure_engine_running_returns_immediately_when_already_up() {
        let engine = CountingEngine {
            ping_calls: Arc::new(AtomicUsize::new(0)),
            succeed_after: 1,
        };
        let result = ensure_engine_running(&engine, Duration::from_secs(1)).await;
        assert!(result.is_ok());
        assert_eq!(engine.ping_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_until_ready_times_out() {
        let engine = CountingEngine {
            ping_calls: Arc::new(AtomicUsize::new(0)),
            succeed_after: 1000,
        };
        let result = poll_until_ready(&engine, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(CoderaftError::EngineStartupTimeout)));
    }
}
