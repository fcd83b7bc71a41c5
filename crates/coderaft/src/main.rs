use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coderaft_core::logging::init()?;

    let parsed = cli::Cli::parse();

    if let Err(e) = parsed.dispatch().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
