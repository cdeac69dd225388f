/// Build engine error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to read build file at {path}: {error}")]
    ManifestReadError { path: PathBuf, error: String },

    #[error("Invalid build file: {0}")]
    InvalidManifest(String),

    #[error("Duplicate target: {target}")]
    DuplicateTarget { target: String },

    #[error("Target '{target}' depends on unknown target '{dependency}'")]
    UnknownDependency { target: String, dependency: String },

    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    #[error("Invalid target configuration: {0}")]
    InvalidTarget(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Corrupt build state at {path}: {error}")]
    CorruptState { path: PathBuf, error: String },

    #[error("Unsupported build state version {found} at {path} (expected {expected})")]
    UnsupportedStateVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("Compilation failed for target '{target}': {error}")]
    CompilationError { target: String, error: String },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),
}

impl BuildError {
    /// Create a manifest read error
    pub fn manifest_read(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::ManifestReadError {
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a compilation error
    pub fn compilation(target: impl Into<String>, error: impl ToString) -> Self {
        Self::CompilationError {
            target: target.into(),
            error: error.to_string(),
        }
    }

    /// Create an unknown dependency error
    pub fn unknown_dependency(target: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            target: target.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a target not found error
    pub fn target_not_found(target: impl Into<String>) -> Self {
        Self::TargetNotFound {
            target: target.into(),
        }
    }

    /// Create a corrupt state error
    pub fn corrupt_state(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::CorruptState {
            path: path.into(),
            error: error.to_string(),
        }
    }
}
