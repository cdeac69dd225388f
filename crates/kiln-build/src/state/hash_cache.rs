//! Two-phase file hash cache
//!
//! A file's content hash is reused while its modification stamp matches the
//! one seen when the hash was computed. Stamps and hashes live in two maps
//! because they are invalidated for different reasons: a stamp entry goes
//! away when a file is known to have been touched out-of-band, a hash entry
//! goes away on an explicit cache clear.

use crate::hasher::ContentHasher;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

/// Modification stamp of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    /// Modification time in nanoseconds since the epoch
    pub mtime_nanos: u64,
    /// File size in bytes
    pub len: u64,
}

impl FileStamp {
    /// Read the current stamp of a file
    pub fn read(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime_nanos = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            mtime_nanos,
            len: metadata.len(),
        })
    }

    pub fn mtime_millis(&self) -> u64 {
        self.mtime_nanos / 1_000_000
    }
}

/// Persisted form of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub path: PathBuf,
    pub stamp: FileStamp,
    pub hash: String,
}

#[derive(Debug, Default)]
struct CacheMaps {
    stamps: HashMap<PathBuf, FileStamp>,
    hashes: HashMap<PathBuf, String>,
}

/// Hash cache shared by all workers
#[derive(Debug, Default)]
pub struct HashCache {
    maps: Mutex<CacheMaps>,
    hits: AtomicU64,
    computed: AtomicU64,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content hash of `path`, recomputed only when its stamp moved.
    ///
    /// The lock is not held while hashing.
    pub fn hash(&self, path: &Path) -> io::Result<String> {
        let stamp = FileStamp::read(path)?;

        {
            let maps = self.maps.lock();
            if maps.stamps.get(path) == Some(&stamp) {
                if let Some(hash) = maps.hashes.get(path) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(hash.clone());
                }
            }
        }

        let hash = ContentHasher::hash_file(path)?;
        self.computed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(path = %path.display(), "hashed file");

        let mut maps = self.maps.lock();
        maps.stamps.insert(path.to_path_buf(), stamp);
        maps.hashes.insert(path.to_path_buf(), hash.clone());
        Ok(hash)
    }

    /// Forget everything known about `path`.
    ///
    /// Call this when a file was modified in a way its stamp may not show.
    pub fn invalidate(&self, path: &Path) {
        let mut maps = self.maps.lock();
        maps.stamps.remove(path);
        maps.hashes.remove(path);
    }

    /// Drop all cached hashes, keeping stamps
    pub fn clear_hashes(&self) {
        self.maps.lock().hashes.clear();
    }

    /// Number of lookups served from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of hashes actually computed
    pub fn computed(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }

    /// Entries that have both a stamp and a hash, sorted by path
    pub fn snapshot(&self) -> Vec<CachedFile> {
        let maps = self.maps.lock();
        let mut entries: Vec<CachedFile> = maps
            .hashes
            .iter()
            .filter_map(|(path, hash)| {
                maps.stamps.get(path).map(|stamp| CachedFile {
                    path: path.clone(),
                    stamp: *stamp,
                    hash: hash.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Replace the cache contents with persisted entries
    pub fn restore(&self, entries: Vec<CachedFile>) {
        let mut maps = self.maps.lock();
        maps.stamps.clear();
        maps.hashes.clear();
        for entry in entries {
            maps.stamps.insert(entry.path.clone(), entry.stamp);
            maps.hashes.insert(entry.path, entry.hash);
        }
    }
}
