//! Build file parsing (kiln.toml)

use crate::compiler::ConfigSource;
use crate::error::{BuildError, BuildResult};
use crate::target::{Target, TargetKind, DEFAULT_OUT_DIR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default build file name
pub const MANIFEST_FILE_NAME: &str = "kiln.toml";

/// Build file (kiln.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildManifest {
    pub project: ProjectMetadata,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectMetadata {
    pub name: String,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
}

/// External tools used to compile targets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolchainConfig {
    #[serde(default = "default_compiler")]
    pub compiler: String,
    #[serde(default = "default_archiver")]
    pub archiver: String,
}

fn default_compiler() -> String {
    "cc".to_string()
}

fn default_archiver() -> String {
    "ar".to_string()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            archiver: default_archiver(),
        }
    }
}

/// One `[[target]]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    pub name: String,
    pub kind: TargetKind,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl BuildManifest {
    /// Parse manifest from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> BuildResult<Self> {
        toml::from_str(content).map_err(|e| BuildError::InvalidManifest(e.to_string()))
    }

    /// Load manifest from file; relative paths resolve against its directory
    pub fn from_file(path: &Path) -> BuildResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BuildError::manifest_read(path, e))?;
        let mut manifest = Self::from_str(&content)?;
        manifest.root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(manifest)
    }

    /// Output directory, resolved against the manifest root
    pub fn out_dir(&self) -> PathBuf {
        let out_dir = self
            .project
            .out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
        self.resolve(&out_dir)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ConfigSource for BuildManifest {
    fn targets(&self) -> BuildResult<Vec<Target>> {
        let out_dir = self.out_dir();
        self.targets
            .iter()
            .map(|config| {
                let target = Target::new(config.name.clone(), config.kind)
                    .with_sources(config.sources.iter().map(|s| self.resolve(s)).collect())
                    .with_dependencies(config.deps.clone())
                    .with_flags(config.flags.clone())
                    .in_out_dir(&out_dir);
                target.validate().map_err(BuildError::InvalidTarget)?;
                Ok(target)
            })
            .collect()
    }
}
