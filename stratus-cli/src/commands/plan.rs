use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use stratus_core::{plan, DeploymentState, Operation, TopologyParams};

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "RESOURCE")]
    id: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "OPERATION")]
    op: String,
    #[tabled(rename = "CHANGED")]
    changed: String,
}

fn colorize_op(op: Operation) -> String {
    let text = op.as_str();
    match op {
        Operation::Create => text.green().to_string(),
        Operation::Update => text.yellow().to_string(),
        Operation::Replace => text.red().to_string(),
        Operation::NoOp => text.dimmed().to_string(),
    }
}

pub fn run(params_path: &Path, state_path: &Path) -> Result<()> {
    let params = TopologyParams::load(params_path)?;
    let graph = params.build_graph()?;
    let state = DeploymentState::load(state_path)?;

    let steps = plan(&graph, &state)?;

    let rows: Vec<PlanRow> = steps
        .iter()
        .map(|s| PlanRow {
            id: s.node_id.clone(),
            kind: s.kind.to_string(),
            op: colorize_op(s.op),
            changed: if s.changed.is_empty() { "-".to_string() } else { s.changed.join(", ") },
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    let pending = steps.iter().filter(|s| s.op != Operation::NoOp).count();
    if pending == 0 {
        println!("\n{}", "Nothing to do, topology is up to date.".green());
    } else {
        println!("\n{} operation(s) pending; run {} to apply.", pending, "stratus up".bold());
    }
    Ok(())
}
