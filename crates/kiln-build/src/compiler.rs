//! Collaborators the engine drives but does not implement

use crate::error::BuildResult;
use crate::state::ToolchainIdentity;
use crate::target::Target;
use std::path::PathBuf;

/// Result of compiling one target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    /// Process exit code; zero means success
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Extra inputs discovered while compiling (e.g. headers), content-hashed
    pub discovered_dependencies: Vec<PathBuf>,
    /// Side-channel files tracked by existence and mtime only
    pub implicit_dependencies: Vec<PathBuf>,
}

impl CompileOutput {
    /// A successful compile with no output
    pub fn success() -> Self {
        Self::default()
    }

    /// A failed compile with the given exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn with_discovered_dependencies(mut self, deps: Vec<PathBuf>) -> Self {
        self.discovered_dependencies = deps;
        self
    }

    pub fn with_implicit_dependencies(mut self, deps: Vec<PathBuf>) -> Self {
        self.implicit_dependencies = deps;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Compiles a single target.
///
/// Called concurrently from worker threads. A non-zero exit code is an
/// ordinary build failure; an `Err` means the compiler could not be run at
/// all. The scheduler treats both as a failed target.
pub trait Compiler: Send + Sync {
    fn compile(&self, target: &Target) -> BuildResult<CompileOutput>;

    /// Identity of the underlying toolchain, if it can be determined
    fn toolchain(&self) -> BuildResult<Option<ToolchainIdentity>> {
        Ok(None)
    }
}

/// Produces the ordered list of targets from some configuration format
pub trait ConfigSource {
    fn targets(&self) -> BuildResult<Vec<Target>>;
}

impl ConfigSource for Vec<Target> {
    fn targets(&self) -> BuildResult<Vec<Target>> {
        Ok(self.clone())
    }
}
