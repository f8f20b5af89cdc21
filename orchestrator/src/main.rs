//! Agent pipeline orchestrator CLI.
//!
//! Turns a tracked issue into reviewed output by running its planned agents
//! in order, mirroring progress as labels on the issue and persisting an
//! execution report per run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use orchestrator::cli::{self, Workspace};
use orchestrator::exit_codes;
use orchestrator::io::config::{DEFAULT_CONFIG_PATH, load_config};
use orchestrator::logging;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Run planned agents against a tracked issue"
)]
struct Cli {
    /// Log verbosity (overridden by `RUST_LOG`).
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    /// Config file (defaults to `.ai/orchestrator.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify the issue and run its agents, then persist a report.
    Run {
        #[arg(long)]
        issue: u64,
        /// Concurrency hint; phases always run sequentially.
        #[arg(long, default_value_t = 3)]
        concurrency: usize,
    },
    /// Print the task plan for an issue and label it as planned.
    Plan {
        #[arg(long)]
        issue: u64,
    },
    /// Run the quality checks and post the review report.
    Review {
        #[arg(long)]
        issue: u64,
    },
    /// List persisted execution reports.
    Reports {
        #[arg(long)]
        issue: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

fn main() {
    let args = Cli::parse();
    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(args: Cli) -> Result<i32> {
    let root = std::env::current_dir().context("resolve working directory")?;
    let config_path = args
        .config
        .unwrap_or_else(|| root.join(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path)?;
    let paths = config.paths.resolve(&root);
    logging::init(args.log_level.as_str(), Some(&paths.logs_dir));

    let ws = Workspace {
        root: &root,
        config: &config,
        paths: &paths,
    };
    match args.command {
        Command::Run { issue, concurrency } => cli::run_pipeline(&ws, issue, concurrency),
        Command::Plan { issue } => cli::plan(&ws, issue),
        Command::Review { issue } => cli::review(&ws, issue),
        Command::Reports { issue } => cli::reports(&ws, issue),
    }
}
