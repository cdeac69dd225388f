pub mod build;
pub mod check;
pub mod clean;
pub mod graph;
pub mod targets;

use crate::compiler::ProcessCompiler;
use crate::GlobalArgs;
use anyhow::{Context, Result};
use kiln_build::{BuildEngine, BuildManifest, ConfigSource, EngineConfig, DEFAULT_STATE_DIR};
use std::sync::Arc;

/// Build file plus the engine configured from it
pub struct Project {
    pub manifest: BuildManifest,
    pub engine: BuildEngine,
}

impl Project {
    /// Load the build file named on the command line
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let manifest = BuildManifest::from_file(&global.file)
            .with_context(|| format!("Failed to load {}", global.file.display()))?;
        let targets = manifest.targets().context("Invalid target configuration")?;
        let compiler = Arc::new(ProcessCompiler::new(&manifest.toolchain, &targets));
        let engine = BuildEngine::new(targets, compiler)?.with_config(engine_config(global, &manifest));
        Ok(Self { manifest, engine })
    }
}

fn engine_config(global: &GlobalArgs, manifest: &BuildManifest) -> EngineConfig {
    let state_dir = global
        .state_dir
        .clone()
        .unwrap_or_else(|| manifest.root.join(DEFAULT_STATE_DIR));
    let mut config = EngineConfig::default().with_state_dir(state_dir);
    if let Some(jobs) = global.jobs {
        config = config.with_jobs(jobs);
    }
    config
}

/// Requested target names as the engine takes them
pub fn target_refs(targets: &[String]) -> Vec<&str> {
    targets.iter().map(String::as_str).collect()
}
