//! Clean Command

use anyhow::{bail, Result};
use clap::Args;
use std::path::Path;
use testdeck_common::ResultStore;
use testdeck_runner::RunnerConfig;
use tracing::warn;

#[derive(Args)]
pub struct CleanArgs {
    /// Remove only the assembled report
    #[arg(long)]
    pub reports: bool,

    /// Remove only captured screenshots
    #[arg(long)]
    pub screenshots: bool,

    /// Remove the report plus all result data (artifacts and history)
    #[arg(long)]
    pub all: bool,
}

/// Remove generated artifacts.
///
/// Exits zero only when every requested removal succeeded.
pub fn execute(config: &RunnerConfig, args: CleanArgs) -> Result<()> {
    if !args.reports && !args.screenshots && !args.all {
        bail!("nothing to clean: pass --reports, --screenshots, or --all");
    }

    let store = ResultStore::new(&config.store_root);
    let mut failures = 0usize;

    if args.reports || args.all {
        failures += remove_tree(&store.report_dir());
    }
    if args.screenshots {
        failures += remove_tree(&store.screenshots_dir());
    }
    if args.all {
        failures += remove_tree(&store.results_dir());
        failures += remove_file(&store.history_path());
    }

    if failures > 0 {
        bail!("{} removal(s) failed", failures);
    }
    println!("clean complete");
    Ok(())
}

fn remove_tree(path: &Path) -> usize {
    if !path.exists() {
        return 0;
    }
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            println!("removed {}", path.display());
            0
        }
        Err(e) => {
            warn!("failed to remove {}: {}", path.display(), e);
            1
        }
    }
}

fn remove_file(path: &Path) -> usize {
    if !path.exists() {
        return 0;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            println!("removed {}", path.display());
            0
        }
        Err(e) => {
            warn!("failed to remove {}: {}", path.display(), e);
            1
        }
    }
}
