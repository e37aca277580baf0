use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "stratus", version, about = "Declarative cloud topology provisioning")]
struct Cli {
    /// Topology params file (defaults are used if absent).
    #[arg(long, global = true, default_value = ".stratus/params.json")]
    params: PathBuf,

    /// Deployment state file.
    #[arg(long, global = true, default_value = ".stratus/state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Realize the topology (create, update, or replace as needed)
    Up(commands::up::UpArgs),
    /// Show what an up would do, without touching anything
    Plan,
    /// Tear down everything recorded in the state file
    Down(commands::down::DownArgs),
    /// Print the outputs exported by the last successful run
    Outputs,
}

#[tokio::main]
async fn main() -> Result<()> {
    stratus_core::observability::init_tracing("warn");

    let cli = Cli::parse();
    match cli.command {
        Commands::Up(args) => commands::up::run(&cli.params, &cli.state, args).await,
        Commands::Plan => commands::plan::run(&cli.params, &cli.state),
        Commands::Down(args) => commands::down::run(&cli.state, args).await,
        Commands::Outputs => commands::outputs::run(&cli.state),
    }
}
