//! Check command - report staleness without building

use super::{target_refs, Project};
use crate::GlobalArgs;
use anyhow::{Context, Result};
use colored::Colorize;

pub fn run(global: &GlobalArgs, targets: &[String], json: bool) -> Result<bool> {
    let project = Project::load(global)?;
    let report = project
        .engine
        .check(&target_refs(targets))
        .context("Check failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    for target in &report.targets {
        let reason = if target.will_build {
            target.reason.describe().yellow()
        } else {
            target.reason.describe().green()
        };
        println!("{:<24} {}", target.name, reason);
    }
    if !global.quiet {
        for (level, batch) in report.batches.iter().enumerate() {
            println!("{} {}: {}", "level".dimmed(), level, batch.join(", "));
        }
    }
    Ok(true)
}
