//! Persisted per-target build records and staleness reasons

use super::hash_cache::FileStamp;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity of the external compiler used for a build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainIdentity {
    /// Human-readable version string
    pub version: String,
    /// Fingerprint of the compiler binary
    pub binary_fingerprint: String,
}

impl ToolchainIdentity {
    pub fn new(version: impl Into<String>, binary_fingerprint: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            binary_fingerprint: binary_fingerprint.into(),
        }
    }
}

impl std::fmt::Display for ToolchainIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short: String = self.binary_fingerprint.chars().take(12).collect();
        write!(f, "{} ({})", self.version, short)
    }
}

/// A content-hashed input recorded at build time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyFingerprint {
    pub path: PathBuf,
    pub fingerprint: String,
}

impl DependencyFingerprint {
    pub fn new(path: impl Into<PathBuf>, fingerprint: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// A side-channel file tracked by its modification stamp only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitDependency {
    pub path: PathBuf,
    /// Stamp observed right after the build that produced it
    pub stamp: FileStamp,
}

impl ImplicitDependency {
    pub fn new(path: impl Into<PathBuf>, stamp: FileStamp) -> Self {
        Self {
            path: path.into(),
            stamp,
        }
    }
}

/// Combined fingerprint of a source list, taken at one point in time.
///
/// The scheduler takes it before invoking the compiler so a record always
/// describes the inputs the compiler actually read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub fingerprint: String,
    /// Newest source modification time in milliseconds
    pub newest_mtime_millis: u64,
}

/// Durable memory of a target's last successful build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub target_name: String,
    pub output_path: PathBuf,
    /// Two-level hash over the source list, in source order
    pub source_fingerprint: String,
    /// Hash of the flag list
    pub command_fingerprint: String,
    /// Explicit inputs resolved at build time, with their content hashes
    #[serde(default)]
    pub direct_dependencies: Vec<DependencyFingerprint>,
    /// Inputs tracked by existence and modification stamp only
    #[serde(default)]
    pub implicit_dependencies: Vec<ImplicitDependency>,
    /// Newest source modification time, in milliseconds since the epoch
    pub source_timestamp: u64,
    /// Logical build clock value at which this record was written
    pub build_timestamp: u64,
    pub build_duration_millis: u64,
}

impl ArtifactRecord {
    /// A record is only usable when it names a target and carries a
    /// source fingerprint.
    pub fn is_valid(&self) -> bool {
        !self.target_name.is_empty() && !self.source_fingerprint.is_empty()
    }
}

/// Why a target needs rebuilding.
///
/// Variants are listed in the order they are checked; the first one that
/// applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyReason {
    Clean,
    MissingArtifact,
    MissingRecord,
    DependencyDirty,
    ToolchainChanged,
    FlagsChanged,
    SourceChanged,
    DependencyChanged,
    ImplicitDependencyChanged,
}

impl DirtyReason {
    pub fn is_dirty(&self) -> bool {
        !matches!(self, Self::Clean)
    }

    /// Short description used in reports and logs
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Clean => "up to date",
            Self::MissingArtifact => "output file is missing",
            Self::MissingRecord => "no previous build recorded",
            Self::DependencyDirty => "a dependency is being rebuilt",
            Self::ToolchainChanged => "compiler changed",
            Self::FlagsChanged => "flags changed",
            Self::SourceChanged => "sources changed",
            Self::DependencyChanged => "a dependency input changed",
            Self::ImplicitDependencyChanged => "an implicit input changed",
        }
    }
}

impl std::fmt::Display for DirtyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}
