//! `coderaft exec`: attach an interactive shell, or run a one-off command.

use coderaft_core::container_manager::island_name;
use coderaft_core::engine::BollardEngine;
use coderaft_core::shell::ShellIntegration;

pub async fn execute(project: &str, command: &[String]) -> anyhow::Result<()> {
    let engine = BollardEngine::connect()?;
    let name = island_name(project);
    let shell = ShellIntegration::new(&engine);

    if command.is_empty() {
        tracing::debug!("attaching interactive shell to '{name}'");
        shell.attach(&name, project).await?;
    } else {
        tracing::info!(?command, "executing command in island '{name}'");
        let result = shell.run(&name, command).await?;
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
    }
    Ok(())
}
