//! `coderaft doctor-ping`: check whether the container engine is reachable.

use coderaft_core::engine::{BollardEngine, Engine};

pub async fn execute() -> anyhow::Result<()> {
    let engine = BollardEngine::connect()?;
    engine.ping().await?;
    println!("done: container engine is reachable");
    Ok(())
}
