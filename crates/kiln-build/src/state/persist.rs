//! On-disk format of the build state

use super::hash_cache::CachedFile;
use super::record::{ArtifactRecord, ToolchainIdentity};
use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// File name of the state document inside the state directory
pub const STATE_FILE_NAME: &str = "state.json";

/// Current format version
pub const STATE_VERSION: u32 = 1;

/// Serialized build state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub toolchain: Option<ToolchainIdentity>,
    /// Last logical build clock value handed out
    #[serde(default)]
    pub clock: u64,
    #[serde(default)]
    pub records: BTreeMap<String, ArtifactRecord>,
    #[serde(default)]
    pub file_cache: Vec<CachedFile>,
}

impl StateFile {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            toolchain: None,
            clock: 0,
            records: BTreeMap::new(),
            file_cache: Vec::new(),
        }
    }

    /// Read a state file.
    ///
    /// Returns `Ok(None)` when the file does not exist. A file that exists
    /// but cannot be understood is an error, never an empty state.
    pub fn load(path: &Path) -> BuildResult<Option<Self>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BuildError::io(path, e)),
        };

        let value: serde_json::Value = serde_json::from_slice(&content)
            .map_err(|e| BuildError::corrupt_state(path, e))?;

        let version = value
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| BuildError::corrupt_state(path, "missing format version"))?;

        if version != u64::from(STATE_VERSION) {
            return Err(BuildError::UnsupportedStateVersion {
                path: path.to_path_buf(),
                found: u32::try_from(version).unwrap_or(u32::MAX),
                expected: STATE_VERSION,
            });
        }

        let state: StateFile =
            serde_json::from_value(value).map_err(|e| BuildError::corrupt_state(path, e))?;
        Ok(Some(state))
    }

    /// Write the state file through a temporary file and a rename, so an
    /// interrupted write leaves the previous file intact.
    pub fn save(&self, path: &Path) -> BuildResult<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| BuildError::BuildFailed(format!("failed to serialize state: {}", e)))?;
        atomic_write(path, &bytes).map_err(|e| BuildError::io(path, e))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Atomically write contents to a file
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".state-")
        .tempfile_in(parent_dir)?;
    temp_file.write_all(contents)?;
    temp_file.as_file().sync_all()?;
    temp_file
        .persist(path)
        .map_err(|e| io::Error::other(format!("failed to persist temp file: {}", e)))?;
    Ok(())
}
