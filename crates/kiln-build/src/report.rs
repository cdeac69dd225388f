//! Build, check and clean reports
//!
//! The engine aggregates every per-target result here; this is the only
//! place that decides whether an invocation counts as a failure.

use crate::graph::CheckedGraph;
use crate::scheduler::{BuildPlan, BuildStats, Outcome, ScheduleResult};
use crate::state::{DirtyReason, StoreStats};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Result of one target in a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Staleness verdict for one target, without building it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTarget {
    pub name: String,
    pub reason: DirtyReason,
    /// Dirty because something it depends on is dirty
    pub propagated: bool,
    pub will_build: bool,
}

impl PlannedTarget {
    fn collect(graph: &CheckedGraph, plan: &BuildPlan) -> Vec<Self> {
        (0..graph.len())
            .map(|id| Self {
                name: graph.name(id).to_string(),
                reason: plan.reason(id),
                propagated: plan.is_propagated(id),
                will_build: plan.needs_build(id),
            })
            .collect()
    }
}

/// Final report of a build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Per-target outcomes in the order they became terminal; empty for a
    /// dry run
    pub targets: Vec<TargetReport>,
    /// Would-be actions; only filled for a dry run
    pub planned: Vec<PlannedTarget>,
    pub stats: BuildStats,
    pub store: StoreStats,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl BuildReport {
    pub(crate) fn from_schedule(result: ScheduleResult, store: StoreStats) -> Self {
        Self {
            targets: result
                .outcomes
                .into_iter()
                .map(|(name, outcome)| TargetReport { name, outcome })
                .collect(),
            planned: Vec::new(),
            stats: result.stats,
            store,
            cancelled: result.cancelled,
            dry_run: false,
        }
    }

    pub(crate) fn planned(graph: &CheckedGraph, plan: &BuildPlan, store: StoreStats) -> Self {
        Self {
            targets: Vec::new(),
            planned: PlannedTarget::collect(graph, plan),
            stats: BuildStats {
                total_targets: graph.len(),
                ..BuildStats::default()
            },
            store,
            cancelled: false,
            dry_run: true,
        }
    }

    /// Outcome of the target named `name`
    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.outcome)
    }

    /// True when no target failed or went unreached and the build was not
    /// cancelled
    pub fn succeeded(&self) -> bool {
        !self.cancelled
            && self
                .targets
                .iter()
                .all(|t| !t.outcome.is_failure() && !t.outcome.not_reached())
    }

    /// Process exit code for this build
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| t.outcome.is_failure())
    }

    pub fn unreached(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| t.outcome.not_reached())
    }

    /// Names of targets that were compiled
    pub fn rebuilt(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, Outcome::Succeeded { .. }))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Human readable summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        if self.dry_run {
            for planned in &self.planned {
                let action = if planned.will_build { "build" } else { "skip" };
                let _ = writeln!(out, "would {:<5} {} ({})", action, planned.name, planned.reason);
            }
            let building = self.planned.iter().filter(|p| p.will_build).count();
            let _ = writeln!(
                out,
                "dry run: {} of {} targets would be built",
                building, self.stats.total_targets
            );
            return out;
        }

        for target in self.failed() {
            if let Outcome::Failed {
                message, stderr, ..
            } = &target.outcome
            {
                let _ = writeln!(out, "error: target '{}' failed: {}", target.name, message);
                for line in stderr.lines() {
                    let _ = writeln!(out, "  | {}", line);
                }
            }
        }

        for target in self.unreached() {
            match &target.outcome {
                Outcome::Blocked { failed_dependency } => {
                    let _ = writeln!(
                        out,
                        "blocked: '{}' (depends on failed '{}')",
                        target.name, failed_dependency
                    );
                }
                _ => {
                    let _ = writeln!(out, "not started: '{}'", target.name);
                }
            }
        }

        if self.cancelled {
            out.push_str("build cancelled\n");
        }

        let stats = &self.stats;
        let _ = writeln!(
            out,
            "{} targets: {} built, {} cached, {} failed, {} not reached",
            stats.total_targets,
            stats.rebuilt_targets,
            stats.cached_targets,
            stats.failed_targets,
            stats.unreached_targets
        );
        let _ = writeln!(
            out,
            "cache hit rate {:.1}%, compile time {:.2}s, wall time {:.2}s",
            stats.cache_hit_rate(),
            stats.compile_time.as_secs_f64(),
            stats.wall_time.as_secs_f64()
        );
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Result of a check
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub targets: Vec<PlannedTarget>,
    /// Levels of targets that could be built concurrently
    pub batches: Vec<Vec<String>>,
}

impl CheckReport {
    pub(crate) fn new(graph: &CheckedGraph, plan: &BuildPlan, batches: Vec<Vec<String>>) -> Self {
        Self {
            targets: PlannedTarget::collect(graph, plan),
            batches,
        }
    }

    pub fn reason(&self, name: &str) -> Option<DirtyReason> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.reason)
    }

    pub fn dirty(&self) -> impl Iterator<Item = &PlannedTarget> {
        self.targets.iter().filter(|t| t.will_build)
    }

    pub fn is_up_to_date(&self) -> bool {
        self.dirty().next().is_none()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for target in &self.targets {
            let _ = writeln!(out, "{:<24} {}", target.name, target.reason.describe());
        }
        for (level, batch) in self.batches.iter().enumerate() {
            let _ = writeln!(out, "level {}: {}", level, batch.join(", "));
        }
        out
    }
}

/// Result of a clean
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    /// Output files that were (or would be) removed
    pub removed: Vec<PathBuf>,
    /// Targets whose records were (or would be) dropped
    pub invalidated: Vec<String>,
    pub dry_run: bool,
}

impl CleanReport {
    pub fn render_text(&self) -> String {
        let verb = if self.dry_run { "would remove" } else { "removed" };
        let mut out = String::new();
        for path in &self.removed {
            let _ = writeln!(out, "{} {}", verb, path.display());
        }
        let _ = writeln!(
            out,
            "{} {} outputs, {} records",
            verb,
            self.removed.len(),
            self.invalidated.len()
        );
        out
    }
}
