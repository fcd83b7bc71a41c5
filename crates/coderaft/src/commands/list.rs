//! `coderaft list`: enumerate islands managed by this tool.

use coderaft_core::container_manager::ContainerManager;
use coderaft_core::engine::BollardEngine;

pub async fn execute() -> anyhow::Result<()> {
    let engine = BollardEngine::connect()?;
    let manager = ContainerManager::new(&engine);
    let islands = manager.list().await?;

    if islands.is_empty() {
        println!("done: no islands found");
        return Ok(());
    }

    for island in islands {
        println!("{}\t{}", island.name, island.status);
    }
    Ok(())
}
