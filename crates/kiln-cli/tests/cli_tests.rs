//! End-to-end tests for the `kiln` binary

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;

const FAKE_CC: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "fakecc 1.0"; exit 0 ;;
esac
out=""
for arg in "$@"; do
  case "$arg" in
    *fail.c) echo "fail.c:1: error: nope" >&2; exit 1 ;;
  esac
done
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
[ -n "$out" ] && echo built > "$out"
exit 0
"#;

fn project(extra_targets: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/util.c"), "int util(void) { return 1; }\n").unwrap();
    fs::write(root.join("src/main.c"), "int main(void) { return 0; }\n").unwrap();
    fs::write(root.join("src/fail.c"), "syntax error\n").unwrap();

    let cc = root.join("fakecc");
    fs::write(&cc, FAKE_CC).unwrap();
    fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).unwrap();

    let manifest = format!(
        r#"
[project]
name = "demo"

[toolchain]
compiler = "{}"

[[target]]
name = "util"
kind = "object"
sources = ["src/util.c"]

[[target]]
name = "app"
kind = "binary"
sources = ["src/main.c"]
deps = ["util"]
{}
"#,
        cc.display(),
        extra_targets
    );
    fs::write(root.join("kiln.toml"), manifest).unwrap();
    dir
}

fn kiln(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(root)
        .env("NO_COLOR", "1")
        .env_remove("KILN_LOG")
        .env_remove("KILN_JSON")
        .env_remove("KILN_JOBS");
    cmd
}

#[test]
fn test_targets_lists_declared_targets() {
    let dir = project("");
    kiln(dir.path())
        .arg("targets")
        .assert()
        .success()
        .stdout(predicate::str::contains("util"))
        .stdout(predicate::str::contains("app"))
        .stdout(predicate::str::contains("<- util"));
}

#[test]
fn test_graph_prints_dot() {
    let dir = project("");
    kiln(dir.path())
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"app\" -> \"util\";"));
}

#[test]
fn test_build_then_everything_cached() {
    let dir = project("");
    kiln(dir.path())
        .args(["build", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 built, 0 cached"));
    assert!(dir.path().join("build/bin/app").exists());
    assert!(dir.path().join(".kiln/state.json").exists());

    kiln(dir.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 built, 2 cached"));
}

#[test]
fn test_check_reports_reasons_without_building() {
    let dir = project("");
    kiln(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("output file is missing"));
    assert!(!dir.path().join("build").exists());
}

#[test]
fn test_failed_target_exits_non_zero() {
    let dir = project(
        r#"
[[target]]
name = "broken"
kind = "object"
sources = ["src/fail.c"]
"#,
    );
    kiln(dir.path())
        .args(["build", "--keep-going"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: target 'broken' failed"))
        .stderr(predicate::str::contains("fail.c:1: error: nope"));
}

#[test]
fn test_cycle_is_reported_with_path() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("x.c"), "").unwrap();
    fs::write(
        dir.path().join("kiln.toml"),
        r#"
[project]
name = "loop"

[[target]]
name = "x"
kind = "object"
sources = ["x.c"]
deps = ["y"]

[[target]]
name = "y"
kind = "object"
sources = ["x.c"]
deps = ["x"]
"#,
    )
    .unwrap();

    kiln(dir.path())
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("x → y → x"));
}

#[test]
fn test_missing_build_file() {
    let dir = TempDir::new().unwrap();
    kiln(dir.path())
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load kiln.toml"));
}

#[test]
fn test_clean_dry_run_keeps_outputs() {
    let dir = project("");
    kiln(dir.path()).arg("build").assert().success();

    kiln(dir.path())
        .args(["clean", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would remove"));
    assert!(dir.path().join("build/bin/app").exists());

    kiln(dir.path()).arg("clean").assert().success();
    assert!(!dir.path().join("build/bin/app").exists());
}
