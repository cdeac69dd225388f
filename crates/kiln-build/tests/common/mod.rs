//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use kiln_build::{
    BuildEngine, BuildResult, CompileOutput, Compiler, EngineConfig, Target, TargetKind,
    ToolchainIdentity,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

type Hook = Box<dyn Fn(&Target) + Send + Sync>;

/// Compiler that concatenates a target's sources into its output and
/// records every call.
#[derive(Default)]
pub struct RecordingCompiler {
    calls: Mutex<Vec<String>>,
    /// Start/finish events, in order, as `+name` / `-name`
    events: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    discovered: Mutex<HashMap<String, Vec<PathBuf>>>,
    toolchain: Mutex<Option<ToolchainIdentity>>,
    delay: Mutex<Duration>,
    hook: Mutex<Option<Hook>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl RecordingCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
        self.events.lock().clear();
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.failing.lock().remove(name);
    }

    pub fn discover(&self, name: &str, paths: Vec<PathBuf>) {
        self.discovered.lock().insert(name.to_string(), paths);
    }

    pub fn set_toolchain(&self, version: &str) {
        *self.toolchain.lock() = Some(ToolchainIdentity::new(version, format!("{}-bin", version)));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn on_compile(&self, hook: impl Fn(&Target) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Compiler for RecordingCompiler {
    fn compile(&self, target: &Target) -> BuildResult<CompileOutput> {
        self.calls.lock().push(target.name.clone());
        self.events.lock().push(format!("+{}", target.name));
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if let Some(hook) = self.hook.lock().as_ref() {
            hook(target);
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let result = if self.failing.lock().contains(&target.name) {
            Ok(CompileOutput::failure(
                1,
                format!("{}.c:1: error: expected ';'", target.name),
            ))
        } else {
            let mut content = String::new();
            for source in &target.sources {
                content.push_str(&fs::read_to_string(source)?);
            }
            fs::write(&target.output_path, content)?;
            let discovered = self
                .discovered
                .lock()
                .get(&target.name)
                .cloned()
                .unwrap_or_default();
            Ok(CompileOutput::success().with_discovered_dependencies(discovered))
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().push(format!("-{}", target.name));
        result
    }

    fn toolchain(&self) -> BuildResult<Option<ToolchainIdentity>> {
        Ok(self.toolchain.lock().clone())
    }
}

/// Scratch project directory with sources and a state dir
pub struct Project {
    pub dir: TempDir,
    pub compiler: Arc<RecordingCompiler>,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        Self {
            dir,
            compiler: RecordingCompiler::new(),
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `src/<file>` and return its path
    pub fn write_source(&self, file: &str, content: &str) -> PathBuf {
        let path = self.path("src").join(file);
        fs::write(&path, content).unwrap();
        path
    }

    /// Target with one source `src/<name>.c`, created if missing
    pub fn target(&self, name: &str, kind: TargetKind, deps: &[&str]) -> Target {
        let source = self.path("src").join(format!("{}.c", name));
        if !source.exists() {
            fs::write(&source, format!("/* {} */\n", name)).unwrap();
        }
        Target::new(name, kind)
            .with_sources(vec![source])
            .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
            .in_out_dir(self.path("build"))
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_state_dir(self.path(".kiln"))
            .with_jobs(4)
    }

    pub fn engine(&self, targets: Vec<Target>) -> BuildEngine {
        self.engine_with(targets, self.config())
    }

    pub fn engine_with(&self, targets: Vec<Target>, config: EngineConfig) -> BuildEngine {
        BuildEngine::new(targets, self.compiler.clone())
            .unwrap()
            .with_config(config)
    }

    /// `lib`, `app -> lib`, `tool -> app` and an unrelated `standalone`
    pub fn chain_targets(&self) -> Vec<Target> {
        vec![
            self.target("lib", TargetKind::Library, &[]),
            self.target("app", TargetKind::Binary, &["lib"]),
            self.target("tool", TargetKind::Binary, &["app"]),
            self.target("standalone", TargetKind::Object, &[]),
        ]
    }
}
