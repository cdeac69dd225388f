//! List declared targets

use super::Project;
use crate::GlobalArgs;
use anyhow::Result;
use colored::Colorize;

pub fn run(global: &GlobalArgs, json: bool) -> Result<bool> {
    let project = Project::load(global)?;
    let targets = project.engine.targets();

    if json {
        println!("{}", serde_json::to_string_pretty(targets)?);
        return Ok(true);
    }

    if !global.quiet {
        println!("{} ({} targets)", project.manifest.project.name.bold(), targets.len());
    }
    for target in targets {
        let deps = if target.dependencies.is_empty() {
            String::new()
        } else {
            format!(" <- {}", target.dependencies.join(", "))
        };
        println!(
            "{:<20} {:<8} {}{}",
            target.name,
            target.kind.to_string(),
            target.output_path.display(),
            deps.dimmed()
        );
    }
    Ok(true)
}
