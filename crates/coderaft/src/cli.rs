use crate::commands;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Per-project development-environment orchestrator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build (if needed), create, start, and bootstrap an island.
    Up {
        /// Project name; the island is named `coderaft_<project>`.
        project: String,
        /// Host workspace path, bind-mounted into the island.
        #[arg(long, default_value = ".")]
        workspace: String,
        /// Base image to build from.
        #[arg(long, default_value = "ubuntu:22.04")]
        image: String,
    },
    /// Stop and remove a project's island.
    Down {
        /// Project name.
        project: String,
    },
    /// Attach an interactive shell, or run a one-off command.
    Exec {
        /// Project name.
        project: String,
        /// Command to run; omit to attach an interactive shell.
        command: Vec<String>,
    },
    /// List islands managed by this tool.
    List,
    /// Check whether the container engine is reachable.
    DoctorPing,
}

impl Cli {
    pub async fn dispatch(self) -> anyhow::Result<()> {
        match self.command {
            Command::Up {
                project,
                workspace,
                image,
            } => commands::up::execute(&project, &workspace, &image).await,
            Command::Down { project } => commands::down::execute(&project).await,
            Command::Exec { project, command } => commands::exec::execute(&project, &command).await,
            Command::List => commands::list::execute().await,
            Command::DoctorPing => commands::doctor_ping::execute().await,
        }
    }
}
