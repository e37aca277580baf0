use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use stratus_core::{AdapterFactory, DeploymentState, EngineOptions, RealizationEngine};

#[derive(Args)]
pub struct DownArgs {
    /// Cloud adapter to delete with.
    #[arg(long)]
    pub adapter: Option<String>,

    /// Timeout for each delete call, in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

pub async fn run(state_path: &Path, args: DownArgs) -> Result<()> {
    let state = DeploymentState::load(state_path)?;
    if state.is_empty() {
        println!("{}", "Nothing to tear down.".dimmed());
        return Ok(());
    }

    let adapter = AdapterFactory::create(args.adapter.as_deref())?;
    let options = EngineOptions {
        call_timeout: Duration::from_secs(args.timeout_secs),
        parallel: false,
    };
    let engine = RealizationEngine::with_options(adapter, options);

    let report = engine.teardown(&state).await?;
    for id in &report.deleted {
        println!("{} deleted {}", "✓".green(), id);
    }
    for (id, reason) in &report.failed {
        eprintln!("{} failed to delete {}: {}", "✗".red(), id.bold(), reason);
    }

    if report.failed.is_empty() {
        std::fs::remove_file(state_path)?;
        println!("\n{} topology torn down", "✓".green().bold());
        Ok(())
    } else {
        // Keep the state file so a retry can pick up the survivors.
        bail!("{} resource(s) could not be deleted", report.failed.len());
    }
}
