//! Dependency graph export

use super::Project;
use crate::GlobalArgs;
use anyhow::Result;

pub fn run(global: &GlobalArgs) -> Result<bool> {
    let project = Project::load(global)?;
    let graph = project.engine.graph()?;
    if let Some(cycle) = graph.detect_cycle() {
        tracing::warn!(%cycle, "dependency graph contains a cycle");
    }
    print!("{}", graph.to_dot());
    Ok(true)
}
