//! Build engine - wires graph, state store and scheduler together

use crate::compiler::{Compiler, ConfigSource};
use crate::error::{BuildError, BuildResult};
use crate::graph::{CheckedGraph, DependencyGraph};
use crate::progress::{NoProgress, Phase, ProgressEvent, ProgressSink};
use crate::report::{BuildReport, CheckReport, CleanReport};
use crate::scheduler::{default_jobs, BuildScheduler, CancelFlag, FailurePolicy, SchedulerConfig};
use crate::state::{StateStore, STATE_FILE_NAME};
use crate::target::Target;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Default directory holding the persisted build state
pub const DEFAULT_STATE_DIR: &str = ".kiln";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory the state file lives in
    pub state_dir: PathBuf,
    /// Number of parallel workers
    pub jobs: usize,
    pub failure_policy: FailurePolicy,
    /// Rebuild every selected target regardless of state
    pub force: bool,
    /// Report what would happen without compiling or touching state
    pub dry_run: bool,
    /// Fall back to an empty store when the state file is unreadable
    pub allow_state_reset: bool,
    pub cancel: CancelFlag,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            jobs: default_jobs(),
            failure_policy: FailurePolicy::default(),
            force: false,
            dry_run: false,
            allow_state_reset: false,
            cancel: CancelFlag::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_allow_state_reset(mut self, allow: bool) -> Self {
        self.allow_state_reset = allow;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Path of the persisted state file
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }

    fn scheduler_config(&self, force: bool) -> SchedulerConfig {
        SchedulerConfig {
            jobs: self.jobs,
            failure_policy: self.failure_policy,
            force,
            cancel: self.cancel.clone(),
        }
    }
}

/// Incremental build engine.
///
/// Owns the target list; every other component refers to targets by name
/// or graph index.
pub struct BuildEngine {
    targets: Vec<Target>,
    config: EngineConfig,
    compiler: Arc<dyn Compiler>,
    progress: Arc<dyn ProgressSink>,
}

impl BuildEngine {
    /// Create an engine over `targets`, validating each one
    pub fn new(targets: Vec<Target>, compiler: Arc<dyn Compiler>) -> BuildResult<Self> {
        for target in &targets {
            target.validate().map_err(BuildError::InvalidTarget)?;
        }
        Ok(Self {
            targets,
            config: EngineConfig::default(),
            compiler,
            progress: Arc::new(NoProgress),
        })
    }

    /// Create an engine from any configuration front end
    pub fn from_source(source: &dyn ConfigSource, compiler: Arc<dyn Compiler>) -> BuildResult<Self> {
        Self::new(source.targets()?, compiler)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Full dependency graph, unchecked
    pub fn graph(&self) -> BuildResult<DependencyGraph> {
        DependencyGraph::from_targets(&self.targets)
    }

    /// Build the requested targets (all when empty) and their dependencies
    pub fn build(&self, requested: &[&str]) -> BuildResult<BuildReport> {
        self.run_build(requested, self.config.force)
    }

    /// Clean the requested targets, then build them unconditionally
    pub fn rebuild(&self, requested: &[&str]) -> BuildResult<BuildReport> {
        self.clean(requested)?;
        self.run_build(requested, true)
    }

    /// Report the staleness of every selected target without building
    pub fn check(&self, requested: &[&str]) -> BuildResult<CheckReport> {
        let graph = self.select(requested)?;
        let store = self.open_store()?;
        self.apply_toolchain(&store)?;
        self.emit(ProgressEvent::phase(Phase::StateLoaded, store.len(), graph.len()));

        let scheduler = BuildScheduler::new(
            &graph,
            &self.targets,
            &store,
            self.compiler.as_ref(),
            self.progress.as_ref(),
            self.config.scheduler_config(false),
        )?;
        let plan = scheduler.plan();
        self.emit(ProgressEvent::phase(
            Phase::DirtySetComputed,
            plan.dirty_count(),
            graph.len(),
        ));

        let batches = graph.topological_batches()?;
        Ok(CheckReport::new(&graph, &plan, batches))
    }

    /// Remove outputs and records of the selected targets
    pub fn clean(&self, requested: &[&str]) -> BuildResult<CleanReport> {
        let graph = self.select(requested)?;
        let store = self.open_store()?;

        let mut report = CleanReport {
            dry_run: self.config.dry_run,
            ..CleanReport::default()
        };
        for name in graph.names() {
            let Some(target) = self.targets.iter().find(|t| &t.name == name) else {
                continue;
            };
            if target.output_path.exists() {
                if !self.config.dry_run {
                    match fs::remove_file(&target.output_path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(BuildError::io(&target.output_path, e)),
                    }
                    store.invalidate_hash_cache(&target.output_path);
                }
                report.removed.push(target.output_path.clone());
            }
            if store.get_record(name).is_some() {
                report.invalidated.push(name.clone());
            }
            if !self.config.dry_run {
                store.invalidate(name);
            }
        }

        if !self.config.dry_run {
            store.save(&self.config.state_file())?;
            self.emit(ProgressEvent::phase(Phase::StateSaved, store.len(), graph.len()));
        }
        tracing::info!(
            removed = report.removed.len(),
            invalidated = report.invalidated.len(),
            dry_run = self.config.dry_run,
            "clean finished"
        );
        Ok(report)
    }

    fn run_build(&self, requested: &[&str], force: bool) -> BuildResult<BuildReport> {
        let graph = self.select(requested)?;
        let store = self.open_store()?;
        self.apply_toolchain(&store)?;
        self.emit(ProgressEvent::phase(Phase::StateLoaded, store.len(), graph.len()));

        let scheduler = BuildScheduler::new(
            &graph,
            &self.targets,
            &store,
            self.compiler.as_ref(),
            self.progress.as_ref(),
            self.config.scheduler_config(force),
        )?;
        let plan = scheduler.plan();
        tracing::info!(
            dirty = plan.dirty_count(),
            total = graph.len(),
            forced = force,
            "dirty set computed"
        );
        self.emit(ProgressEvent::phase(
            Phase::DirtySetComputed,
            plan.dirty_count(),
            graph.len(),
        ));

        if self.config.dry_run {
            return Ok(BuildReport::planned(&graph, &plan, store.stats()));
        }

        let result = scheduler.execute(&plan);

        store.save(&self.config.state_file())?;
        self.emit(ProgressEvent::phase(Phase::StateSaved, store.len(), graph.len()));

        let report = BuildReport::from_schedule(result, store.stats());
        tracing::info!(
            rebuilt = report.stats.rebuilt_targets,
            cached = report.stats.cached_targets,
            failed = report.stats.failed_targets,
            "build finished"
        );
        Ok(report)
    }

    /// Build and cycle-check the full graph, then narrow it to the
    /// dependency closure of `requested`.
    ///
    /// The whole graph is always checked, so a cycle is reported even when
    /// it lies outside the selection.
    fn select(&self, requested: &[&str]) -> BuildResult<CheckedGraph> {
        self.emit(ProgressEvent::phase(
            Phase::ConfigLoaded,
            self.targets.len(),
            self.targets.len(),
        ));

        let graph = self.graph()?.check()?;
        let graph = if requested.is_empty() {
            graph
        } else {
            let roots = requested
                .iter()
                .map(|name| {
                    graph
                        .node_id(name)
                        .ok_or_else(|| BuildError::target_not_found(*name))
                })
                .collect::<BuildResult<Vec<_>>>()?;
            graph.subgraph(&graph.dependency_closure(&roots))
        };

        tracing::debug!(
            targets = graph.len(),
            edges = graph.edge_count(),
            "dependency graph analyzed"
        );
        self.emit(ProgressEvent::phase(
            Phase::GraphAnalyzed,
            graph.len(),
            self.targets.len(),
        ));
        Ok(graph)
    }

    fn open_store(&self) -> BuildResult<StateStore> {
        let store = StateStore::new();
        let path = self.config.state_file();
        match store.load(&path) {
            Ok(_) => {}
            Err(e @ (BuildError::CorruptState { .. } | BuildError::UnsupportedStateVersion { .. }))
                if self.config.allow_state_reset =>
            {
                tracing::warn!(error = %e, "discarding unreadable build state");
                store.reset();
            }
            Err(e) => return Err(e),
        }
        Ok(store)
    }

    fn apply_toolchain(&self, store: &StateStore) -> BuildResult<()> {
        if let Some(identity) = self.compiler.toolchain()? {
            tracing::debug!(toolchain = %identity, "toolchain identified");
            store.set_toolchain(identity);
        }
        Ok(())
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.on_progress(&event);
    }
}
