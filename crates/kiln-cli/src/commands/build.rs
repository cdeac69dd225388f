//! Build and rebuild commands

use super::{target_refs, Project};
use crate::config::Config;
use crate::GlobalArgs;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use kiln_build::{BuildReport, FailurePolicy, Phase, ProgressEvent};
use std::sync::Arc;

/// Build command arguments
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Targets to build (default: all)
    pub targets: Vec<String>,
    /// Rebuild every selected target, ignoring saved state
    #[arg(long)]
    pub force: bool,
    /// Keep building unrelated targets after a failure
    #[arg(long, short = 'k')]
    pub keep_going: bool,
    /// Show what would be built without compiling anything
    #[arg(long, short = 'n')]
    pub dry_run: bool,
    /// Start from an empty state if the saved state is unreadable
    #[arg(long)]
    pub reset_state: bool,
    /// JSON output
    #[arg(long)]
    pub json: bool,
}

/// Run `build` (or `rebuild`). Returns whether the build succeeded.
pub fn run(global: &GlobalArgs, cli_config: &Config, args: BuildArgs, rebuild: bool) -> Result<bool> {
    let json = args.json || cli_config.default_json;
    let project = Project::load(global)?;

    let policy = if args.keep_going {
        FailurePolicy::ContinueOnError
    } else {
        FailurePolicy::FailFast
    };
    let config = project
        .engine
        .config()
        .clone()
        .with_failure_policy(policy)
        .with_force(args.force)
        .with_dry_run(args.dry_run)
        .with_allow_state_reset(args.reset_state);

    let mut engine = project.engine.with_config(config);
    if !json && !global.quiet {
        engine = engine.with_progress(Arc::new(print_progress));
    }

    let requested = target_refs(&args.targets);
    let report = if rebuild {
        engine.rebuild(&requested).context("Rebuild failed")?
    } else {
        engine.build(&requested).context("Build failed")?
    };

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report, global.quiet);
    }
    Ok(report.succeeded())
}

fn print_progress(event: &ProgressEvent) {
    if event.phase != Phase::TargetFinished {
        return;
    }
    let (Some(target), Some(status)) = (&event.target, event.status) else {
        return;
    };
    let word = match status {
        "built" => status.green(),
        "cached" => status.dimmed(),
        "failed" => status.red().bold(),
        _ => status.yellow(),
    };
    eprintln!("[{}/{}] {:>8} {}", event.current, event.total, word, target);
}

fn print_report(report: &BuildReport, quiet: bool) {
    let text = report.render_text();
    if report.succeeded() {
        if !quiet {
            print!("{}", text);
        }
        return;
    }
    eprint!("{}", text);
    eprintln!("{}", "build failed".red().bold());
}
