//! Content-addressed build state
//!
//! The [`StateStore`] remembers the last successful build of every target and
//! answers whether a target must be rebuilt. Records sit behind a
//! reader/writer lock; the file hash cache has its own lock so hashing on one
//! worker never blocks record reads on another.

pub mod hash_cache;
pub mod persist;
pub mod record;

pub use hash_cache::{CachedFile, FileStamp, HashCache};
pub use persist::{StateFile, STATE_FILE_NAME, STATE_VERSION};
pub use record::{
    ArtifactRecord, DependencyFingerprint, DirtyReason, ImplicitDependency, SourceSnapshot,
    ToolchainIdentity,
};

use crate::error::{BuildError, BuildResult};
use crate::hasher::ContentHasher;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing store activity in this process.
///
/// A build checks each target once, while planning. The hash counters count
/// every file lookup, including the source snapshot taken before a compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Dirty checks performed
    pub checks: u64,
    /// Checks that found the target clean
    pub clean_hits: u64,
    /// Records written by successful builds
    pub rebuilt: u64,
    /// File hashes computed from content
    pub hashes_computed: u64,
    /// File hashes served from the stamp cache
    pub hash_cache_hits: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    records: HashMap<String, ArtifactRecord>,
    /// Targets known to need a rebuild regardless of their record
    dirty: HashSet<String>,
    current_toolchain: Option<ToolchainIdentity>,
    persisted_toolchain: Option<ToolchainIdentity>,
    /// Targets whose record was written in this session
    updated: HashSet<String>,
}

/// Persistent record of successful builds
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<StoreInner>,
    hash_cache: HashCache,
    clock: AtomicU64,
    checks: AtomicU64,
    clean_hits: AtomicU64,
    rebuilt: AtomicU64,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the store contents with the state file at `path`.
    ///
    /// Returns `Ok(false)` when there is no state file, leaving the store
    /// empty. A file that exists but is unreadable is an error.
    pub fn load(&self, path: &Path) -> BuildResult<bool> {
        let Some(state) = StateFile::load(path)? else {
            tracing::debug!(path = %path.display(), "no previous build state");
            self.reset();
            return Ok(false);
        };

        let mut inner = self.inner.write();
        inner.records = state
            .records
            .into_iter()
            .filter(|(_, record)| record.is_valid())
            .collect();
        inner.dirty.clear();
        inner.updated.clear();
        inner.persisted_toolchain = state.toolchain;
        self.hash_cache.restore(state.file_cache);
        self.clock.fetch_max(state.clock, Ordering::SeqCst);

        tracing::debug!(
            path = %path.display(),
            records = inner.records.len(),
            "loaded build state"
        );
        Ok(true)
    }

    /// Drop all records and cached hashes
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.records.clear();
        inner.dirty.clear();
        inner.updated.clear();
        inner.persisted_toolchain = None;
        self.hash_cache.restore(Vec::new());
    }

    /// Write records, toolchain identity and the hash cache to `path`.
    ///
    /// When the toolchain changed this session, records that were not
    /// rebuilt with the new toolchain are dropped instead of being saved
    /// under an identity that does not describe them.
    pub fn save(&self, path: &Path) -> BuildResult<()> {
        let mut inner = self.inner.write();

        let toolchain_changed = matches!(
            (&inner.current_toolchain, &inner.persisted_toolchain),
            (Some(current), Some(persisted)) if current != persisted
        );
        if toolchain_changed {
            let StoreInner {
                records, updated, ..
            } = &mut *inner;
            let before = records.len();
            records.retain(|name, _| updated.contains(name));
            tracing::debug!(
                dropped = before - records.len(),
                "dropping records built with a previous toolchain"
            );
        }

        let toolchain = inner
            .current_toolchain
            .clone()
            .or_else(|| inner.persisted_toolchain.clone());

        let state = StateFile {
            version: STATE_VERSION,
            toolchain: toolchain.clone(),
            clock: self.clock.load(Ordering::SeqCst),
            records: inner
                .records
                .iter()
                .map(|(name, record)| (name.clone(), record.clone()))
                .collect(),
            file_cache: self.hash_cache.snapshot(),
        };
        state.save(path)?;

        inner.persisted_toolchain = toolchain;
        tracing::debug!(path = %path.display(), records = state.records.len(), "saved build state");
        Ok(())
    }

    /// Set the toolchain used for this session.
    ///
    /// If no identity was loaded from disk, the persisted identity is
    /// initialised to the same value, so a first build never reports
    /// [`DirtyReason::ToolchainChanged`].
    pub fn set_toolchain(&self, identity: ToolchainIdentity) {
        let mut inner = self.inner.write();
        if inner.persisted_toolchain.is_none() {
            inner.persisted_toolchain = Some(identity.clone());
        } else if inner.persisted_toolchain.as_ref() != Some(&identity) {
            tracing::info!(toolchain = %identity, "toolchain changed since last build");
        }
        inner.current_toolchain = Some(identity);
    }

    pub fn current_toolchain(&self) -> Option<ToolchainIdentity> {
        self.inner.read().current_toolchain.clone()
    }

    pub fn persisted_toolchain(&self) -> Option<ToolchainIdentity> {
        self.inner.read().persisted_toolchain.clone()
    }

    /// Decide whether a target must be rebuilt.
    ///
    /// Rules are evaluated in [`DirtyReason`] order and the first match wins.
    /// Any input that cannot be read makes the target dirty.
    pub fn check_dirty<S: AsRef<str>>(
        &self,
        name: &str,
        output_path: &Path,
        sources: &[PathBuf],
        flags: &[S],
    ) -> DirtyReason {
        self.checks.fetch_add(1, Ordering::Relaxed);
        let reason = self.evaluate_dirty(name, output_path, sources, flags);
        if reason.is_dirty() {
            tracing::debug!(target_name = name, reason = %reason, "target is dirty");
        } else {
            self.clean_hits.fetch_add(1, Ordering::Relaxed);
        }
        reason
    }

    fn evaluate_dirty<S: AsRef<str>>(
        &self,
        name: &str,
        output_path: &Path,
        sources: &[PathBuf],
        flags: &[S],
    ) -> DirtyReason {
        if !output_path.exists() {
            return DirtyReason::MissingArtifact;
        }

        let (record, marked_dirty, toolchain_changed) = {
            let inner = self.inner.read();
            let record = inner.records.get(name).filter(|r| r.is_valid()).cloned();
            let toolchain_changed = matches!(
                (&inner.current_toolchain, &inner.persisted_toolchain),
                (Some(current), Some(persisted)) if current != persisted
            );
            (record, inner.dirty.contains(name), toolchain_changed)
        };

        let Some(record) = record else {
            return DirtyReason::MissingRecord;
        };
        if marked_dirty {
            return DirtyReason::DependencyDirty;
        }
        if toolchain_changed {
            return DirtyReason::ToolchainChanged;
        }
        if ContentHasher::hash_flags(flags) != record.command_fingerprint {
            return DirtyReason::FlagsChanged;
        }

        match self.snapshot_sources(sources) {
            Ok(snapshot) if snapshot.fingerprint == record.source_fingerprint => {}
            Ok(_) => return DirtyReason::SourceChanged,
            Err(e) => {
                tracing::warn!(target_name = name, error = %e, "cannot hash sources");
                return DirtyReason::SourceChanged;
            }
        }

        for dep in &record.direct_dependencies {
            match self.hash_cache.hash(&dep.path) {
                Ok(hash) if hash == dep.fingerprint => {}
                _ => return DirtyReason::DependencyChanged,
            }
        }

        for dep in &record.implicit_dependencies {
            match FileStamp::read(&dep.path) {
                Ok(stamp) if stamp == dep.stamp => {}
                _ => return DirtyReason::ImplicitDependencyChanged,
            }
        }

        DirtyReason::Clean
    }

    /// Fingerprint `sources` as they are on disk right now.
    ///
    /// Each source hash comes from the stamp cache; the hashes are then
    /// concatenated in list order and hashed again.
    pub fn snapshot_sources(&self, sources: &[PathBuf]) -> io::Result<SourceSnapshot> {
        let mut hashes = Vec::with_capacity(sources.len());
        let mut newest = 0;
        for source in sources {
            hashes.push(self.hash_cache.hash(source)?);
            newest = newest.max(FileStamp::read(source)?.mtime_millis());
        }
        Ok(SourceSnapshot {
            fingerprint: ContentHasher::combine(&hashes),
            newest_mtime_millis: newest,
        })
    }

    /// Record a successful build of `name`.
    ///
    /// `sources` must be the snapshot taken before the compiler ran: an
    /// edit made while compiling then shows up as a source change on the
    /// next check. `resolved_deps` are content-hashed now and
    /// `implicit_deps` are stamped now. Clears any pending dirty mark.
    #[allow(clippy::too_many_arguments)]
    pub fn update_record<S: AsRef<str>>(
        &self,
        name: &str,
        output_path: &Path,
        sources: &SourceSnapshot,
        resolved_deps: &[PathBuf],
        implicit_deps: &[PathBuf],
        flags: &[S],
        duration_millis: u64,
    ) -> BuildResult<()> {
        // The output was just rewritten, possibly within the same mtime tick.
        self.hash_cache.invalidate(output_path);

        let mut direct_dependencies = Vec::with_capacity(resolved_deps.len());
        for path in resolved_deps {
            let fingerprint = self
                .hash_cache
                .hash(path)
                .map_err(|e| BuildError::io(path, e))?;
            direct_dependencies.push(DependencyFingerprint::new(path, fingerprint));
        }

        let mut implicit_dependencies = Vec::with_capacity(implicit_deps.len());
        for path in implicit_deps {
            let stamp = FileStamp::read(path).map_err(|e| BuildError::io(path, e))?;
            implicit_dependencies.push(ImplicitDependency::new(path, stamp));
        }

        let record = ArtifactRecord {
            target_name: name.to_string(),
            output_path: output_path.to_path_buf(),
            source_fingerprint: sources.fingerprint.clone(),
            command_fingerprint: ContentHasher::hash_flags(flags),
            direct_dependencies,
            implicit_dependencies,
            source_timestamp: sources.newest_mtime_millis,
            build_timestamp: self.tick(),
            build_duration_millis: duration_millis,
        };

        let mut inner = self.inner.write();
        inner.records.insert(name.to_string(), record);
        inner.dirty.remove(name);
        inner.updated.insert(name.to_string());
        self.rebuilt.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove the record of `name` and force it dirty
    pub fn invalidate(&self, name: &str) {
        let mut inner = self.inner.write();
        inner.records.remove(name);
        inner.updated.remove(name);
        inner.dirty.insert(name.to_string());
    }

    /// Mark `name` dirty because something it depends on is being rebuilt
    pub fn mark_dirty(&self, name: &str) {
        self.inner.write().dirty.insert(name.to_string());
    }

    /// Whether `name` carries a dirty mark
    pub fn is_marked_dirty(&self, name: &str) -> bool {
        self.inner.read().dirty.contains(name)
    }

    /// Forget cached stamp and hash of a file modified out-of-band
    pub fn invalidate_hash_cache(&self, path: &Path) {
        self.hash_cache.invalidate(path);
    }

    /// Drop every cached content hash
    pub fn clear_hash_cache(&self) {
        self.hash_cache.clear_hashes();
    }

    /// Copy of the record for `name`
    pub fn get_record(&self, name: &str) -> Option<ArtifactRecord> {
        self.inner.read().records.get(name).cloned()
    }

    /// Names of all recorded targets, sorted
    pub fn record_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().records.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Snapshot of store counters
    pub fn stats(&self) -> StoreStats {
        let _guard = self.inner.read();
        StoreStats {
            checks: self.checks.load(Ordering::Relaxed),
            clean_hits: self.clean_hits.load(Ordering::Relaxed),
            rebuilt: self.rebuilt.load(Ordering::Relaxed),
            hashes_computed: self.hash_cache.computed(),
            hash_cache_hits: self.hash_cache.hits(),
        }
    }

    /// Advance the logical build clock
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: StateStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                store: StateStore::new(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.path(name);
            fs::write(&path, content).unwrap();
            self.store.invalidate_hash_cache(&path);
            path
        }

        fn snapshot(&self, sources: &[PathBuf]) -> SourceSnapshot {
            self.store.snapshot_sources(sources).unwrap()
        }

        fn build(&self, name: &str, sources: &[PathBuf], flags: &[&str]) -> PathBuf {
            let output = self.write(&format!("{}.out", name), "artifact");
            self.store
                .update_record(name, &output, &self.snapshot(sources), &[], &[], flags, 5)
                .unwrap();
            output
        }
    }

    #[test]
    fn test_missing_artifact_comes_first() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let reason = fx
            .store
            .check_dirty("a", &fx.path("missing.out"), &[src], &["-O2"]);
        assert_eq!(reason, DirtyReason::MissingArtifact);
    }

    #[test]
    fn test_missing_record() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.write("a.out", "x");
        assert_eq!(
            fx.store.check_dirty("a", &out, &[src], &["-O2"]),
            DirtyReason::MissingRecord
        );
    }

    #[test]
    fn test_clean_after_update() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &["-O2"]);
        assert_eq!(
            fx.store.check_dirty("a", &out, &[src], &["-O2"]),
            DirtyReason::Clean
        );
        assert_eq!(fx.store.stats().rebuilt, 1);
    }

    #[test]
    fn test_flags_changed() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &["-O2"]);
        assert_eq!(
            fx.store.check_dirty("a", &out, &[src], &["-O3"]),
            DirtyReason::FlagsChanged
        );
    }

    #[test]
    fn test_source_changed() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &[]);
        fx.write("a.c", "b");
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::SourceChanged
        );
    }

    #[test]
    fn test_source_order_matters() {
        let fx = Fixture::new();
        let a = fx.write("a.c", "a");
        let b = fx.write("b.c", "b");
        let out = fx.build("t", &[a.clone(), b.clone()], &[]);
        assert_eq!(
            fx.store.check_dirty::<&str>("t", &out, &[b, a], &[]),
            DirtyReason::SourceChanged
        );
    }

    #[test]
    fn test_unreadable_source_is_dirty() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &[]);
        fs::remove_file(&src).unwrap();
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::SourceChanged
        );
    }

    #[test]
    fn test_dependency_changed() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let header = fx.write("a.h", "v1");
        let out = fx.write("a.out", "artifact");
        fx.store
            .update_record::<&str>("a", &out, &fx.snapshot(&[src.clone()]), &[header], &[], &[], 1)
            .unwrap();

        fx.write("a.h", "v2");
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::DependencyChanged
        );
    }

    fn build_with_side_file(fx: &Fixture, src: &Path, side: &Path) -> PathBuf {
        let out = fx.write("a.out", "artifact");
        fx.store
            .update_record::<&str>(
                "a",
                &out,
                &fx.snapshot(&[src.to_path_buf()]),
                &[],
                &[side.to_path_buf()],
                &[],
                1,
            )
            .unwrap();
        out
    }

    #[test]
    fn test_implicit_dependency_removed() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let side = fx.write("a.map", "side");
        let out = build_with_side_file(&fx, &src, &side);
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src.clone()], &[]),
            DirtyReason::Clean
        );

        fs::remove_file(&side).unwrap();
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::ImplicitDependencyChanged
        );
    }

    #[test]
    fn test_implicit_dependency_written_after_output() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.write("a.out", "artifact");
        std::thread::sleep(std::time::Duration::from_millis(20));
        let side = fx.write("a.map", "written by the linker after the output");
        fx.store
            .update_record::<&str>("a", &out, &fx.snapshot(&[src.clone()]), &[], &[side], &[], 1)
            .unwrap();

        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::Clean
        );
    }

    #[test]
    fn test_implicit_dependency_touched_later() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let side = fx.write("a.map", "side");
        let out = build_with_side_file(&fx, &src, &side);

        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write("a.map", "side, regenerated");
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::ImplicitDependencyChanged
        );
    }

    #[test]
    fn test_missing_implicit_dependency_fails_update() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.write("a.out", "artifact");
        let result = fx.store.update_record::<&str>(
            "a",
            &out,
            &fx.snapshot(&[src]),
            &[],
            &[fx.path("never-written.map")],
            &[],
            1,
        );
        assert!(matches!(result, Err(BuildError::IoError { .. })));
        assert!(fx.store.get_record("a").is_none());
    }

    #[test]
    fn test_record_keeps_fingerprint_taken_before_compile() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "int a;");
        let before = fx.snapshot(&[src.clone()]);

        // Source saved again while the compiler was still running
        fx.write("a.c", "int a; /* edited */");
        let out = fx.write("a.out", "artifact");
        fx.store
            .update_record::<&str>("a", &out, &before, &[], &[], &[], 1)
            .unwrap();

        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::SourceChanged
        );
    }

    #[test]
    fn test_mark_dirty_beats_hash_checks() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &["-O2"]);
        fx.store.mark_dirty("a");
        assert_eq!(
            fx.store.check_dirty("a", &out, &[src.clone()], &["-O3"]),
            DirtyReason::DependencyDirty
        );

        fx.store
            .update_record("a", &out, &fx.snapshot(&[src.clone()]), &[], &[], &["-O3"], 1)
            .unwrap();
        assert!(!fx.store.is_marked_dirty("a"));
        assert_eq!(
            fx.store.check_dirty("a", &out, &[src], &["-O3"]),
            DirtyReason::Clean
        );
    }

    #[test]
    fn test_invalidate_removes_record() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &[]);
        fx.store.invalidate("a");
        assert!(fx.store.get_record("a").is_none());
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::MissingRecord
        );
    }

    #[test]
    fn test_first_toolchain_is_not_a_change() {
        let fx = Fixture::new();
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &[]);
        fx.store.set_toolchain(ToolchainIdentity::new("cc 1", "aaa"));
        assert_eq!(
            fx.store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::Clean
        );
        assert_eq!(fx.store.persisted_toolchain(), fx.store.current_toolchain());
    }

    #[test]
    fn test_toolchain_change_dirties_everything() {
        let fx = Fixture::new();
        let state_path = fx.path("state.json");
        let src = fx.write("a.c", "a");
        fx.store.set_toolchain(ToolchainIdentity::new("cc 1", "aaa"));
        let out = fx.build("a", &[src.clone()], &[]);
        fx.store.save(&state_path).unwrap();

        let store = StateStore::new();
        assert!(store.load(&state_path).unwrap());
        store.set_toolchain(ToolchainIdentity::new("cc 2", "bbb"));
        assert_eq!(
            store.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::ToolchainChanged
        );

        // Saving without rebuilding must not bless the old record.
        store.save(&state_path).unwrap();
        let reloaded = StateStore::new();
        reloaded.load(&state_path).unwrap();
        assert!(reloaded.get_record("a").is_none());
        assert_eq!(
            reloaded.persisted_toolchain(),
            Some(ToolchainIdentity::new("cc 2", "bbb"))
        );
    }

    #[test]
    fn test_save_load_round_trip() {
        let fx = Fixture::new();
        let state_path = fx.path("state/state.json");
        let src = fx.write("a.c", "a");
        let header = fx.write("a.h", "h");
        let side = fx.write("a.map", "m");
        let out = fx.write("a.out", "artifact");
        fx.store.set_toolchain(ToolchainIdentity::new("cc 1", "aaa"));
        fx.store
            .update_record(
                "a",
                &out,
                &fx.snapshot(&[src.clone()]),
                &[header.clone()],
                &[side.clone()],
                &["-O2", "-g"],
                42,
            )
            .unwrap();
        fx.build("b", &[src.clone()], &[]);
        fx.store.save(&state_path).unwrap();

        let fresh = StateStore::new();
        assert!(fresh.load(&state_path).unwrap());
        assert_eq!(fresh.record_names(), vec!["a".to_string(), "b".to_string()]);
        for name in ["a", "b"] {
            assert_eq!(fresh.get_record(name), fx.store.get_record(name));
        }
        assert_eq!(fresh.persisted_toolchain(), fx.store.current_toolchain());
    }

    #[test]
    fn test_clock_is_monotonic_across_loads() {
        let fx = Fixture::new();
        let state_path = fx.path("state.json");
        let src = fx.write("a.c", "a");
        fx.build("a", &[src.clone()], &[]);
        fx.build("b", &[src.clone()], &[]);
        let last = fx.store.get_record("b").unwrap().build_timestamp;
        fx.store.save(&state_path).unwrap();

        let fresh = StateStore::new();
        fresh.load(&state_path).unwrap();
        let out = fx.write("c.out", "artifact");
        let snapshot = fresh.snapshot_sources(&[src]).unwrap();
        fresh
            .update_record::<&str>("c", &out, &snapshot, &[], &[], &[], 1)
            .unwrap();
        assert!(fresh.get_record("c").unwrap().build_timestamp > last);
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let fx = Fixture::new();
        let state_path = fx.write("state.json", "garbage");
        assert!(matches!(
            fx.store.load(&state_path),
            Err(BuildError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_absent_state_is_empty() {
        let fx = Fixture::new();
        assert!(!fx.store.load(&fx.path("state.json")).unwrap());
        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_persisted_hash_cache_avoids_rehash() {
        let fx = Fixture::new();
        let state_path = fx.path("state.json");
        let src = fx.write("a.c", "a");
        let out = fx.build("a", &[src.clone()], &[]);
        fx.store.save(&state_path).unwrap();

        let fresh = StateStore::new();
        fresh.load(&state_path).unwrap();
        assert_eq!(
            fresh.check_dirty::<&str>("a", &out, &[src], &[]),
            DirtyReason::Clean
        );
        let stats = fresh.stats();
        assert_eq!(stats.hashes_computed, 0);
        assert!(stats.hash_cache_hits >= 1);
        assert_eq!(stats.clean_hits, 1);
    }
}
