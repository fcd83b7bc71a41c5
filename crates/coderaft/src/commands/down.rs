//! `coderaft down`: stop and remove a project's island.

use coderaft_core::container_manager::{island_name, ContainerManager};
use coderaft_core::engine::BollardEngine;
use coderaft_core::tunables::Tunables;

pub async fn execute(project: &str) -> anyhow::Result<()> {
    let engine = BollardEngine::connect()?;
    let tunables = Tunables::from_env();
    let manager = ContainerManager::new(&engine);
    let name = island_name(project);

    if !manager.exists(&name).await? {
        tracing::debug!("island '{name}' does not exist, nothing to tear down");
        println!("warning: island '{name}' does not exist");
        return Ok(());
    }

    manager
        .stop(&name, tunables.stop_timeout.as_secs() as i64)
        .await?;
    manager.remove(&name).await?;
    tracing::info!("island '{name}' removed");
    println!("done: island '{name}' removed");
    Ok(())
}
