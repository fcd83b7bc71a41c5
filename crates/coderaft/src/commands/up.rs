//! `coderaft up`: create (if needed), start, and bootstrap an island.

use coderaft_core::agent::{Agent, DEFAULT_HISTORY_PATH};
use coderaft_core::container_manager::{island_name, ContainerManager};
use coderaft_core::engine::BollardEngine;
use coderaft_core::host_supervisor::ensure_engine_running;
use std::time::Duration;

pub async fn execute(project: &str, workspace: &str, image: &str) -> anyhow::Result<()> {
    let engine = BollardEngine::connect()?;
    ensure_engine_running(&engine, Duration::from_secs(10)).await?;

    let name = island_name(project);
    let manager = ContainerManager::new(&engine);

    if !manager.exists(&name).await? {
        tracing::debug!(image, workspace, "creating island '{name}'");
        manager.create(&name, image, workspace, "/island", None).await?;
        println!("done: created island '{name}'");
    }

    manager.start(&name).await?;
    manager.wait_ready(&name, Duration::from_secs(30)).await?;

    Agent::new(&engine)
        .bootstrap(&name, DEFAULT_HISTORY_PATH)
        .await?;

    tracing::info!("island '{name}' is up");
    println!("done: island '{name}' is up");
    Ok(())
}
