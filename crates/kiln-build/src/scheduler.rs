//! Parallel build scheduling
//!
//! Targets move through `Pending -> Ready -> Running -> {Succeeded, Failed,
//! Skipped}`. A fixed pool of workers pulls from one ready queue; when a
//! target reaches a terminal state its dependents' in-degrees drop and any
//! that reach zero are queued. Dependents of a failed target are never
//! queued.

use crate::compiler::Compiler;
use crate::graph::{CheckedGraph, InDegreeTracker, NodeId};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::state::{DirtyReason, StateStore};
use crate::target::Target;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What to do once a target fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop starting new targets; let running ones finish
    #[default]
    FailFast,
    /// Keep building everything that does not depend on a failure
    ContinueOnError,
}

/// Cooperative cancellation handle shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Running compiles are allowed to finish.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of workers
    pub jobs: usize,
    pub failure_policy: FailurePolicy,
    /// Rebuild every target regardless of its state
    pub force: bool,
    pub cancel: CancelFlag,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            failure_policy: FailurePolicy::default(),
            force: false,
            cancel: CancelFlag::new(),
        }
    }
}

/// Available parallelism, or 1 when it cannot be determined
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Scheduling state of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TargetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Final result for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Compiled successfully
    Succeeded {
        reason: DirtyReason,
        /// Rebuilt because a full rebuild was requested
        forced: bool,
        #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
        duration: Duration,
    },
    /// Up to date; not compiled
    Skipped,
    /// Compile failed or could not be run
    Failed {
        message: String,
        exit_code: Option<i32>,
        stderr: String,
        #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
        duration: Duration,
    },
    /// Never started because a dependency failed
    Blocked { failed_dependency: String },
    /// Never started because the build stopped early (fail-fast or
    /// cancellation)
    Abandoned,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl Outcome {
    pub fn status_word(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "built",
            Self::Skipped => "cached",
            Self::Failed { .. } => "failed",
            Self::Blocked { .. } => "blocked",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the target was never started
    pub fn not_reached(&self) -> bool {
        matches!(self, Self::Blocked { .. } | Self::Abandoned)
    }
}

/// Aggregate build counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub total_targets: usize,
    pub rebuilt_targets: usize,
    pub cached_targets: usize,
    pub failed_targets: usize,
    /// Targets never started (blocked or abandoned)
    pub unreached_targets: usize,
    /// Sum of compile durations across workers
    #[serde(rename = "compile_time_ms", serialize_with = "serialize_millis")]
    pub compile_time: Duration,
    /// Wall-clock time of the scheduling run
    #[serde(rename = "wall_time_ms", serialize_with = "serialize_millis")]
    pub wall_time: Duration,
}

impl BuildStats {
    /// Percentage of targets served from the cache
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_targets == 0 {
            return 0.0;
        }
        self.cached_targets as f64 * 100.0 / self.total_targets as f64
    }
}

/// Staleness decision for every target, computed once before scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Reason per node id, with propagation applied
    reasons: Vec<DirtyReason>,
    /// Nodes dirty only because something they depend on is dirty
    propagated: Vec<bool>,
    force: bool,
}

impl BuildPlan {
    pub fn reason(&self, id: NodeId) -> DirtyReason {
        self.reasons[id]
    }

    pub fn is_propagated(&self, id: NodeId) -> bool {
        self.propagated[id]
    }

    pub fn needs_build(&self, id: NodeId) -> bool {
        self.force || self.reasons[id].is_dirty()
    }

    /// Number of targets that will be compiled
    pub fn dirty_count(&self) -> usize {
        (0..self.reasons.len()).filter(|&id| self.needs_build(id)).count()
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }
}

/// Outcome of a scheduling run
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    /// Target outcomes; terminal targets in completion order, followed by
    /// targets that were never reached
    pub outcomes: Vec<(String, Outcome)>,
    pub stats: BuildStats,
    pub cancelled: bool,
}

impl ScheduleResult {
    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }

    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(|(_, o)| !o.is_failure() && !o.not_reached())
    }
}

struct LiveState {
    tracker: InDegreeTracker,
    ready: VecDeque<NodeId>,
    status: Vec<TargetStatus>,
    outcomes: Vec<Option<Outcome>>,
    finished: Vec<NodeId>,
    running: usize,
    stop: bool,
    cancelled: bool,
}

struct Shared {
    live: Mutex<LiveState>,
    wake: Condvar,
}

/// Drives a worker pool over a checked dependency graph
pub struct BuildScheduler<'a> {
    graph: &'a CheckedGraph,
    /// Targets indexed by node id
    arena: Vec<&'a Target>,
    store: &'a StateStore,
    compiler: &'a dyn Compiler,
    progress: &'a dyn ProgressSink,
    config: SchedulerConfig,
}

impl<'a> BuildScheduler<'a> {
    /// Create a scheduler.
    ///
    /// Every graph node must have a matching entry in `targets`.
    pub fn new(
        graph: &'a CheckedGraph,
        targets: &'a [Target],
        store: &'a StateStore,
        compiler: &'a dyn Compiler,
        progress: &'a dyn ProgressSink,
        config: SchedulerConfig,
    ) -> crate::error::BuildResult<Self> {
        let mut arena = Vec::with_capacity(graph.len());
        for name in graph.names() {
            let target = targets
                .iter()
                .find(|t| &t.name == name)
                .ok_or_else(|| crate::error::BuildError::target_not_found(name.as_str()))?;
            arena.push(target);
        }
        Ok(Self {
            graph,
            arena,
            store,
            compiler,
            progress,
            config,
        })
    }

    /// Ask the state store about every target, then propagate dirtiness to
    /// all transitive dependents. Does not modify the store.
    pub fn plan(&self) -> BuildPlan {
        let mut reasons: Vec<DirtyReason> = self
            .arena
            .iter()
            .map(|t| {
                self.store
                    .check_dirty(&t.name, &t.output_path, &t.sources, &t.flags)
            })
            .collect();

        let seeds: Vec<NodeId> = if self.config.force {
            (0..reasons.len()).collect()
        } else {
            (0..reasons.len()).filter(|&id| reasons[id].is_dirty()).collect()
        };

        let mut propagated = vec![false; reasons.len()];
        for id in self.graph.transitive_dependents(&seeds) {
            propagated[id] = true;
            let own = reasons[id];
            if own == DirtyReason::Clean || own > DirtyReason::DependencyDirty {
                reasons[id] = DirtyReason::DependencyDirty;
            }
        }

        BuildPlan {
            reasons,
            propagated,
            force: self.config.force,
        }
    }

    /// Run the plan to completion and return per-target outcomes
    pub fn execute(&self, plan: &BuildPlan) -> ScheduleResult {
        let started = Instant::now();

        for (id, target) in self.arena.iter().enumerate() {
            if plan.is_propagated(id) {
                self.store.mark_dirty(&target.name);
            }
        }

        let mut tracker = InDegreeTracker::new(self.graph);
        let ready: VecDeque<NodeId> = tracker.take_ready().into();
        let mut status = vec![TargetStatus::Pending; self.graph.len()];
        for &id in &ready {
            status[id] = TargetStatus::Ready;
        }

        let shared = Shared {
            live: Mutex::new(LiveState {
                tracker,
                ready,
                status,
                outcomes: vec![None; self.graph.len()],
                finished: Vec::with_capacity(self.graph.len()),
                running: 0,
                stop: false,
                cancelled: false,
            }),
            wake: Condvar::new(),
        };

        let jobs = self.config.jobs.clamp(1, self.graph.len().max(1));
        tracing::debug!(jobs, targets = self.graph.len(), "starting workers");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("kiln-worker-{}", i))
            .build();
        match pool {
            Ok(pool) => pool.scope(|scope| {
                for _ in 0..jobs {
                    let shared = &shared;
                    scope.spawn(move |_| self.worker(shared, plan));
                }
            }),
            Err(e) => {
                tracing::warn!("failed to create worker pool ({e}), building sequentially");
                self.worker(&shared, plan);
            }
        }

        let live = shared.live.into_inner();
        self.collect(live, started.elapsed())
    }

    fn worker(&self, shared: &Shared, plan: &BuildPlan) {
        loop {
            let next = {
                let mut live = shared.live.lock();
                loop {
                    if !live.stop && self.config.cancel.is_cancelled() {
                        tracing::info!("build cancelled, waiting for running targets");
                        live.stop = true;
                        live.cancelled = true;
                    }
                    if live.stop && !live.ready.is_empty() {
                        live.ready.clear();
                    }
                    if let Some(id) = live.ready.pop_front() {
                        live.status[id] = TargetStatus::Running;
                        live.running += 1;
                        break Some(id);
                    }
                    if live.running == 0 {
                        shared.wake.notify_all();
                        break None;
                    }
                    shared.wake.wait(&mut live);
                }
            };

            let Some(id) = next else {
                return;
            };

            let outcome = self.run_target(id, plan);

            let mut live = shared.live.lock();
            live.running -= 1;
            self.finish(&mut live, id, outcome);
            shared.wake.notify_all();
        }
    }

    /// Record a terminal state and release dependents. Runs under the live
    /// state lock, so progress events are emitted in completion order.
    fn finish(&self, live: &mut LiveState, id: NodeId, outcome: Outcome) {
        let name = &self.arena[id].name;
        match &outcome {
            Outcome::Succeeded {
                reason,
                forced,
                duration,
            } => {
                live.status[id] = TargetStatus::Succeeded;
                tracing::info!(target_name = %name, %reason, forced, ?duration, "built");
            }
            Outcome::Skipped => {
                live.status[id] = TargetStatus::Skipped;
                tracing::debug!(target_name = %name, "up to date");
            }
            Outcome::Failed { message, .. } => {
                live.status[id] = TargetStatus::Failed;
                tracing::warn!(target_name = %name, error = %message, "failed");
            }
            Outcome::Blocked { .. } | Outcome::Abandoned => {}
        }

        if outcome.is_failure() {
            if self.config.failure_policy == FailurePolicy::FailFast {
                live.stop = true;
            }
        } else {
            let released = live.tracker.complete(self.graph, id);
            for dependent in released {
                live.status[dependent] = TargetStatus::Ready;
                live.ready.push_back(dependent);
            }
        }

        let status = outcome.status_word();
        live.outcomes[id] = Some(outcome);
        live.finished.push(id);
        self.progress.on_progress(&ProgressEvent::target(
            live.finished.len(),
            self.graph.len(),
            name,
            status,
        ));
    }

    fn run_target(&self, id: NodeId, plan: &BuildPlan) -> Outcome {
        let target = self.arena[id];

        // Staleness is decided once, while planning.
        if !plan.needs_build(id) {
            return Outcome::Skipped;
        }
        let reason = plan.reason(id);

        tracing::debug!(target_name = %target.name, %reason, "compiling");
        let started = Instant::now();

        let sources = match self.store.snapshot_sources(&target.sources) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return Outcome::Failed {
                    message: format!("cannot hash sources: {}", e),
                    exit_code: None,
                    stderr: String::new(),
                    duration: started.elapsed(),
                };
            }
        };

        if let Some(parent) = target.output_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return Outcome::Failed {
                    message: format!("cannot create {}: {}", parent.display(), e),
                    exit_code: None,
                    stderr: String::new(),
                    duration: started.elapsed(),
                };
            }
        }

        let output = match self.compiler.compile(target) {
            Ok(output) => output,
            Err(e) => {
                return Outcome::Failed {
                    message: e.to_string(),
                    exit_code: None,
                    stderr: String::new(),
                    duration: started.elapsed(),
                };
            }
        };
        let duration = started.elapsed();

        if !output.succeeded() {
            return Outcome::Failed {
                message: format!("compiler exited with status {}", output.exit_code),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
                duration,
            };
        }

        if !target.output_path.exists() {
            return Outcome::Failed {
                message: format!(
                    "compiler reported success but {} was not produced",
                    target.output_path.display()
                ),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
                duration,
            };
        }

        let mut resolved: Vec<PathBuf> = self
            .graph
            .dependencies(id)
            .iter()
            .map(|&dep| self.arena[dep].output_path.clone())
            .collect();
        resolved.extend(output.discovered_dependencies);

        if let Err(e) = self.store.update_record(
            &target.name,
            &target.output_path,
            &sources,
            &resolved,
            &output.implicit_dependencies,
            &target.flags,
            duration.as_millis() as u64,
        ) {
            return Outcome::Failed {
                message: e.to_string(),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
                duration,
            };
        }

        Outcome::Succeeded {
            reason,
            forced: self.config.force,
            duration,
        }
    }

    fn collect(&self, live: LiveState, wall_time: Duration) -> ScheduleResult {
        let LiveState {
            outcomes,
            status,
            finished,
            cancelled,
            ..
        } = live;

        let mut stats = BuildStats {
            total_targets: self.graph.len(),
            wall_time,
            ..BuildStats::default()
        };

        let mut ordered = Vec::with_capacity(self.graph.len());
        for &id in &finished {
            if let Some(outcome) = outcomes[id].clone() {
                match &outcome {
                    Outcome::Succeeded { duration, .. } => {
                        stats.rebuilt_targets += 1;
                        stats.compile_time += *duration;
                    }
                    Outcome::Skipped => stats.cached_targets += 1,
                    Outcome::Failed { duration, .. } => {
                        stats.failed_targets += 1;
                        stats.compile_time += *duration;
                    }
                    Outcome::Blocked { .. } | Outcome::Abandoned => {}
                }
                ordered.push((self.arena[id].name.clone(), outcome));
            }
        }

        for id in 0..self.graph.len() {
            if status[id].is_terminal() {
                continue;
            }
            let outcome = match self.failed_ancestor(id, &outcomes) {
                Some(failed) => Outcome::Blocked {
                    failed_dependency: self.arena[failed].name.clone(),
                },
                None => Outcome::Abandoned,
            };
            stats.unreached_targets += 1;
            ordered.push((self.arena[id].name.clone(), outcome));
        }

        ScheduleResult {
            outcomes: ordered,
            stats,
            cancelled,
        }
    }

    /// Nearest failed target among the dependencies of `id`
    fn failed_ancestor(&self, id: NodeId, outcomes: &[Option<Outcome>]) -> Option<NodeId> {
        let mut queue: VecDeque<NodeId> = self.graph.dependencies(id).iter().copied().collect();
        let mut seen = vec![false; self.graph.len()];
        while let Some(dep) = queue.pop_front() {
            if std::mem::replace(&mut seen[dep], true) {
                continue;
            }
            if matches!(outcomes[dep], Some(Outcome::Failed { .. })) {
                return Some(dep);
            }
            queue.extend(self.graph.dependencies(dep).iter().copied());
        }
        None
    }
}
