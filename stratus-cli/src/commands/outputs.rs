use std::path::Path;

use anyhow::{bail, Result};
use colored::Colorize;

use stratus_core::{DeploymentState, ResourceKind};

pub fn run(state_path: &Path) -> Result<()> {
    let state = DeploymentState::load(state_path)?;
    if state.is_empty() {
        bail!("no recorded deployment; run {} first", "stratus up".bold());
    }

    let mut found = false;
    for (id, record) in &state.resources {
        if record.kind != ResourceKind::Output {
            continue;
        }
        match record.realized_attrs.get("value") {
            Some(value) => println!("{} {} = {}", "➜".green(), id.bold(), value),
            None => eprintln!("{} {} has no recorded value", "✗".red(), id.bold()),
        }
        found = true;
    }

    if !found {
        println!("{}", "The topology exports no outputs.".dimmed());
    }
    Ok(())
}
