use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod compiler;
mod config;

/// Kiln incremental build tool.
///
/// Builds the targets declared in kiln.toml, recompiling only what changed
/// since the last successful build.
///
/// EXAMPLES:
///     kiln build                  Build every target
///     kiln build app -j 4         Build app and its dependencies on 4 workers
///     kiln check                  Show which targets are out of date
///     kiln graph | dot -Tsvg      Render the dependency graph
///
/// ENVIRONMENT VARIABLES:
///     KILN_LOG          Log filter (e.g. "kiln_build=debug")
///     KILN_JOBS         Default number of parallel jobs
///     KILN_JSON         Set to '1' for JSON reports by default
///     NO_COLOR          Set to disable colored output
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the build file
    #[arg(long, short = 'f', global = true, default_value = kiln_build::MANIFEST_FILE_NAME)]
    pub file: PathBuf,
    /// Directory holding build state (default: .kiln next to the build file)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    /// Number of parallel jobs
    #[arg(long, short = 'j', global = true, env = "KILN_JOBS")]
    pub jobs: Option<usize>,
    /// More log output (repeat for more)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,
    /// Errors only
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build targets that are out of date
    ///
    /// EXAMPLES:
    ///     kiln build                  Build everything
    ///     kiln build app --keep-going Keep building unrelated targets on failure
    ///     kiln build --dry-run        Show what would be built
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        args: commands::build::BuildArgs,
    },

    /// Remove outputs and state, then build everything requested
    Rebuild {
        #[command(flatten)]
        args: commands::build::BuildArgs,
    },

    /// Remove build outputs and forget their state
    Clean {
        /// Targets to clean (default: all)
        targets: Vec<String>,
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Report which targets are out of date and why
    #[command(visible_alias = "c")]
    Check {
        /// Targets to check (default: all)
        targets: Vec<String>,
        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// List declared targets
    Targets {
        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency graph in Graphviz DOT format
    Graph,
}

fn init_tracing(global: &GlobalArgs) {
    let default = if global.quiet {
        "error"
    } else {
        match global.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_env("KILN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(!global.no_color)
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let global = &cli.global;
    let cli_config = config::Config::from_env();

    match cli.command {
        Commands::Build { args } => commands::build::run(global, &cli_config, args, false),
        Commands::Rebuild { args } => commands::build::run(global, &cli_config, args, true),
        Commands::Clean { targets, dry_run } => commands::clean::run(global, &targets, dry_run),
        Commands::Check { targets, json } => {
            commands::check::run(global, &targets, json || cli_config.default_json)
        }
        Commands::Targets { json } => {
            commands::targets::run(global, json || cli_config.default_json)
        }
        Commands::Graph => commands::graph::run(global),
    }
}

fn main() -> ExitCode {
    let mut cli = Cli::parse();
    cli.global.no_color |= config::Config::from_env().no_color;
    if cli.global.no_color {
        colored::control::set_override(false);
    }
    init_tracing(&cli.global);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}
