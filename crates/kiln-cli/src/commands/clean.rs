//! Clean command

use super::{target_refs, Project};
use crate::GlobalArgs;
use anyhow::{Context, Result};

pub fn run(global: &GlobalArgs, targets: &[String], dry_run: bool) -> Result<bool> {
    let project = Project::load(global)?;
    let config = project.engine.config().clone().with_dry_run(dry_run);
    let engine = project.engine.with_config(config);

    let report = engine
        .clean(&target_refs(targets))
        .context("Failed to clean build artifacts")?;

    if !global.quiet {
        print!("{}", report.render_text());
    }
    Ok(true)
}
