//! testdeck CLI - Main Entry Point
//!
//! Command-line interface for discovering tests, driving runs, and
//! managing the result store and reports.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{clean, list, report, run};
use testdeck_runner::RunnerConfig;

/// testdeck CLI - browser-test orchestration and reporting
#[derive(Parser)]
#[command(name = "testdeck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project root holding the test files
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Result store root
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered test files
    List(list::ListArgs),

    /// Run a selection of tests
    Run(run::RunArgs),

    /// Rebuild the report from the current store contents
    Report,

    /// Remove generated reports, screenshots, or all result data
    Clean(clean::CleanArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(|| testdeck_common::default_store_path().join("config.toml"));
    let mut config = RunnerConfig::load(&config_path)?;

    if let Some(project_root) = cli.project_root {
        config.project_root = project_root;
    }
    if let Some(store_root) = cli.store_root {
        config.store_root = store_root;
    }

    match cli.command {
        Commands::List(args) => list::execute(&config, args),
        Commands::Run(args) => run::execute(&config, args).await,
        Commands::Report => report::execute(&config),
        Commands::Clean(args) => clean::execute(&config, args),
    }
}
