//! Content fingerprints for files and flag lists
//!
//! All fingerprints are lowercase hex SHA-256 digests, so they are stable
//! across runs, platforms and processes.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Stateless content hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    /// Hash the contents of a file.
    ///
    /// The file is streamed, so large inputs are never held in memory.
    pub fn hash_file(path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Hash an in-memory byte slice
    pub fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Hash an ordered list of command-line flags.
    ///
    /// Each flag is length-prefixed so `["-a", "b"]` and `["-ab"]` differ.
    pub fn hash_flags<S: AsRef<str>>(flags: &[S]) -> String {
        let mut hasher = Sha256::new();
        hasher.update((flags.len() as u64).to_le_bytes());
        for flag in flags {
            let flag = flag.as_ref();
            hasher.update((flag.len() as u64).to_le_bytes());
            hasher.update(flag.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Combine per-file hashes into one fingerprint.
    ///
    /// The individual hashes are concatenated in the given order and the
    /// concatenation is hashed again, so reordering the list changes the
    /// result.
    pub fn combine<S: AsRef<str>>(hashes: &[S]) -> String {
        let mut concatenated = String::with_capacity(hashes.len() * 64);
        for hash in hashes {
            concatenated.push_str(hash.as_ref());
        }
        Self::hash_bytes(concatenated.as_bytes())
    }
}
