//! Subprocess compiler driving a C-style toolchain
//!
//! Sources are compiled one by one into intermediate objects next to the
//! output (`<output dir>/<name>.objs/`), each with a make-style depfile.
//! Binaries are then linked and libraries archived. Objects with a single
//! source are compiled straight to their output.

use kiln_build::{
    BuildError, BuildResult, CompileOutput, Compiler, ContentHasher, Target, TargetKind,
    ToolchainConfig, ToolchainIdentity,
};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs the configured compiler and archiver as child processes
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    compiler: String,
    archiver: String,
    /// Output paths by target name, used to link dependencies
    outputs: HashMap<String, (TargetKind, PathBuf)>,
}

/// Captured result of one child process
struct Step {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

impl ProcessCompiler {
    pub fn new(toolchain: &ToolchainConfig, targets: &[Target]) -> Self {
        Self {
            compiler: toolchain.compiler.clone(),
            archiver: toolchain.archiver.clone(),
            outputs: targets
                .iter()
                .map(|t| (t.name.clone(), (t.kind, t.output_path.clone())))
                .collect(),
        }
    }

    fn run(&self, target: &Target, program: &str, args: &[String]) -> BuildResult<Step> {
        tracing::debug!(target_name = %target.name, program, ?args, "spawning");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::compilation(&target.name, format!("cannot run {}: {}", program, e)))?
            .wait_with_output()
            .map_err(|e| BuildError::compilation(&target.name, e))?;

        Ok(Step {
            exit_code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Compile one source to `object`, returning the step and the headers
    /// listed in its depfile.
    fn compile_source(
        &self,
        target: &Target,
        source: &Path,
        object: &Path,
    ) -> BuildResult<(Step, Vec<PathBuf>)> {
        let depfile = object.with_extension("d");
        let mut args = vec!["-c".to_string()];
        args.extend(target.flags.iter().cloned());
        args.push(path_arg(source));
        args.extend(["-o".to_string(), path_arg(object)]);
        args.extend(["-MMD".to_string(), "-MF".to_string(), path_arg(&depfile)]);

        let step = self.run(target, &self.compiler, &args)?;
        let headers = match fs::read_to_string(&depfile) {
            Ok(content) => parse_depfile(&content)
                .into_iter()
                .filter(|p| p != source)
                .collect(),
            Err(_) => Vec::new(),
        };
        Ok((step, headers))
    }

    fn object_dir(target: &Target) -> PathBuf {
        let parent = target.output_path.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!("{}.objs", target.name))
    }

    /// Outputs of library and object dependencies, in declaration order
    fn link_inputs(&self, target: &Target) -> Vec<String> {
        target
            .dependencies
            .iter()
            .filter_map(|dep| self.outputs.get(dep))
            .filter(|(kind, _)| *kind != TargetKind::Binary)
            .map(|(_, path)| path_arg(path))
            .collect()
    }
}

impl Compiler for ProcessCompiler {
    fn compile(&self, target: &Target) -> BuildResult<CompileOutput> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut headers = Vec::new();

        if target.kind == TargetKind::Object && target.sources.len() == 1 {
            let (step, found) = self.compile_source(target, &target.sources[0], &target.output_path)?;
            return Ok(CompileOutput {
                exit_code: step.exit_code,
                stdout: step.stdout,
                stderr: step.stderr,
                discovered_dependencies: found,
                implicit_dependencies: Vec::new(),
            });
        }
        if target.kind == TargetKind::Object {
            return Err(BuildError::compilation(
                &target.name,
                "object targets take exactly one source file",
            ));
        }

        let object_dir = Self::object_dir(target);
        fs::create_dir_all(&object_dir).map_err(|e| BuildError::io(&object_dir, e))?;

        let mut objects = Vec::with_capacity(target.sources.len());
        for (i, source) in target.sources.iter().enumerate() {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "source".to_string());
            let object = object_dir.join(format!("{}-{}.o", i, stem));
            let (step, found) = self.compile_source(target, source, &object)?;
            stdout.push_str(&step.stdout);
            stderr.push_str(&step.stderr);
            if step.exit_code != 0 {
                return Ok(CompileOutput {
                    exit_code: step.exit_code,
                    stdout,
                    stderr,
                    ..CompileOutput::default()
                });
            }
            headers.extend(found);
            objects.push(object);
        }

        let step = match target.kind {
            TargetKind::Library => {
                let mut args = vec!["rcs".to_string(), path_arg(&target.output_path)];
                args.extend(objects.iter().map(|o| path_arg(o)));
                self.run(target, &self.archiver, &args)?
            }
            _ => {
                let mut args: Vec<String> = objects.iter().map(|o| path_arg(o)).collect();
                args.extend(self.link_inputs(target));
                args.extend(target.flags.iter().cloned());
                args.extend(["-o".to_string(), path_arg(&target.output_path)]);
                self.run(target, &self.compiler, &args)?
            }
        };
        stdout.push_str(&step.stdout);
        stderr.push_str(&step.stderr);

        headers.sort();
        headers.dedup();
        Ok(CompileOutput {
            exit_code: step.exit_code,
            stdout,
            stderr,
            discovered_dependencies: headers,
            implicit_dependencies: objects,
        })
    }

    fn toolchain(&self) -> BuildResult<Option<ToolchainIdentity>> {
        let output = match Command::new(&self.compiler)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(compiler = %self.compiler, error = %e, "cannot query compiler version");
                return Ok(None);
            }
        };
        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let fingerprint = match locate(&self.compiler) {
            Some(path) => ContentHasher::hash_file(&path).map_err(|e| BuildError::io(&path, e))?,
            None => String::new(),
        };
        Ok(Some(ToolchainIdentity::new(version, fingerprint)))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Resolve `program` the way the shell would
fn locate(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

/// Prerequisites listed in a make-style depfile
fn parse_depfile(content: &str) -> Vec<PathBuf> {
    let joined = content.replace("\\\n", " ").replace("\\\r\n", " ");
    let mut deps = Vec::new();
    for rule in joined.lines() {
        let Some((_, prerequisites)) = rule.split_once(": ") else {
            continue;
        };
        let mut current = String::new();
        let mut chars = prerequisites.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&' ') => {
                    current.push(' ');
                    chars.next();
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        deps.push(PathBuf::from(std::mem::take(&mut current)));
                    }
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            deps.push(PathBuf::from(current));
        }
    }
    deps
}
