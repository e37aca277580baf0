use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

use stratus_core::{
    export_outputs, plan, AdapterFactory, DeploymentState, EngineOptions, RealizationEngine,
    TopologyParams,
};

use super::colorize_status;

#[derive(Args)]
pub struct UpArgs {
    /// Cloud adapter to provision with.
    #[arg(long)]
    pub adapter: Option<String>,

    /// Realize one resource at a time instead of in parallel waves.
    #[arg(long)]
    pub sequential: bool,

    /// Timeout for each provisioning call, in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "RESOURCE")]
    id: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "IDENTITY")]
    identity: String,
}

pub async fn run(params_path: &Path, state_path: &Path, args: UpArgs) -> Result<()> {
    let params = TopologyParams::load(params_path)?;
    let graph = params.build_graph()?;
    let prior = DeploymentState::load(state_path)?;
    let steps = plan(&graph, &prior)?;

    let adapter = AdapterFactory::create(args.adapter.as_deref())?;
    let options = EngineOptions {
        call_timeout: Duration::from_secs(args.timeout_secs),
        parallel: !args.sequential,
    };
    let engine = RealizationEngine::with_options(Arc::clone(&adapter), options);

    // Ctrl-C aborts the run and triggers rollback of what was created.
    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let report = engine.apply(&graph, &steps, &prior).await?;

    let rows: Vec<ResourceRow> = report
        .resources
        .values()
        .map(|r| ResourceRow {
            id: r.node_id.clone(),
            kind: r.kind.to_string(),
            status: colorize_status(r.status),
            identity: r.identity.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if let Some(failure) = &report.failure {
        eprintln!(
            "\n{} {} failed: {}",
            "✗".red().bold(),
            failure.node_id.bold(),
            failure.error
        );
        if failure.rollback.fully_rolled_back() {
            eprintln!("{}", "All created resources were rolled back.".blue());
        } else {
            eprintln!(
                "{} {:?}",
                "Rollback incomplete, clean up manually:".red(),
                failure.rollback.remaining()
            );
        }
        bail!("run {} failed", report.run_id);
    }

    let state = DeploymentState::record_run(&report.run_id, &graph, &report.resources)?;
    state.save(state_path)?;

    let outputs = export_outputs(&report.resources, &graph.output_bindings())?;
    println!();
    for (name, value) in &outputs {
        println!("{} {} = {}", "➜".green(), name.bold(), value);
    }
    println!("\n{} run {} complete", "✓".green().bold(), report.run_id);
    Ok(())
}
