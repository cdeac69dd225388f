/// Build target types
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory outputs are placed under
pub const DEFAULT_OUT_DIR: &str = "build";

/// Kind of build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Executable program
    #[serde(alias = "bin")]
    Binary,
    /// Static library archive
    #[serde(alias = "lib")]
    Library,
    /// Single relocatable object
    #[serde(alias = "obj")]
    Object,
}

impl TargetKind {
    /// Get the conventional output directory name for this target kind
    pub fn output_dir_name(&self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::Library => "lib",
            Self::Object => "obj",
        }
    }

    /// Output file name for a target of this kind
    pub fn output_filename(&self, name: &str) -> String {
        match self {
            Self::Binary => name.to_string(),
            Self::Library => format!("lib{}.a", name),
            Self::Object => format!("{}.o", name),
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Library => write!(f, "library"),
            Self::Object => write!(f, "object"),
        }
    }
}

/// A single buildable unit: sources in, one output file out.
///
/// Targets are immutable once extracted from configuration. Every other
/// component refers to them by name (or by graph index), never by copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target name
    pub name: String,
    /// Target kind
    pub kind: TargetKind,
    /// Resolved source files, in declaration order
    pub sources: Vec<PathBuf>,
    /// Names of targets this one depends on
    pub dependencies: Vec<String>,
    /// Compiler flags, in declaration order
    pub flags: Vec<String>,
    /// Output artifact path
    pub output_path: PathBuf,
}

impl Target {
    /// Create a new target whose output lives under the default out dir
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        let name = name.into();
        let output_path = Self::compute_output_path(Path::new(DEFAULT_OUT_DIR), &name, kind);
        Self {
            name,
            kind,
            sources: Vec::new(),
            dependencies: Vec::new(),
            flags: Vec::new(),
            output_path,
        }
    }

    /// Add source files
    pub fn with_sources(mut self, sources: Vec<PathBuf>) -> Self {
        self.sources = sources;
        self
    }

    /// Add dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set compiler flags
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    /// Place the output under `out_dir`
    pub fn in_out_dir(mut self, out_dir: impl AsRef<Path>) -> Self {
        self.output_path = Self::compute_output_path(out_dir.as_ref(), &self.name, self.kind);
        self
    }

    /// Override the output path entirely
    pub fn with_output_path(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    fn compute_output_path(out_dir: &Path, name: &str, kind: TargetKind) -> PathBuf {
        out_dir
            .join(kind.output_dir_name())
            .join(kind.output_filename(name))
    }

    /// Validate the target configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Target name cannot be empty".to_string());
        }

        if self.sources.is_empty() {
            return Err(format!("Target '{}' has no source files", self.name));
        }

        Ok(())
    }
}
