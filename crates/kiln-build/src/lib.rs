//! Kiln incremental build engine
//!
//! Provides build orchestration for native targets including:
//! - Dependency graph construction and cycle detection
//! - Content-addressed staleness checks with a persisted state store
//! - Parallel scheduling over a worker pool with dirty propagation
//! - Fail-fast and keep-going failure policies
//! - Build, clean, rebuild and check operations with structured reports

pub mod compiler;
pub mod engine;
pub mod error;
pub mod graph;
pub mod hasher;
pub mod manifest;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod state;
pub mod target;

// Re-export main types
pub use compiler::{CompileOutput, Compiler, ConfigSource};
pub use engine::{BuildEngine, EngineConfig, DEFAULT_STATE_DIR};
pub use error::{BuildError, BuildResult};
pub use graph::{CheckedGraph, Cycle, DependencyGraph, InDegreeTracker, NodeId};
pub use hasher::ContentHasher;
pub use manifest::{BuildManifest, ProjectMetadata, TargetConfig, ToolchainConfig, MANIFEST_FILE_NAME};
pub use progress::{NoProgress, Phase, ProgressEvent, ProgressSink};
pub use report::{BuildReport, CheckReport, CleanReport, PlannedTarget, TargetReport};
pub use scheduler::{
    BuildPlan, BuildScheduler, BuildStats, CancelFlag, FailurePolicy, Outcome, ScheduleResult,
    SchedulerConfig, TargetStatus,
};
pub use state::{
    ArtifactRecord, DirtyReason, ImplicitDependency, SourceSnapshot, StateStore, StoreStats,
    ToolchainIdentity,
};
pub use target::{Target, TargetKind};
