//! Run Command

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use testdeck_common::Selection;
use testdeck_runner::{discovery, EventChannel, Orchestrator, RunnerConfig};

#[derive(Args)]
pub struct RunArgs {
    /// Tests to run, as filePath::testName pairs
    pub tests: Vec<String>,

    /// Run every test case declared in the given file
    #[arg(long)]
    pub all_in: Option<String>,
}

pub async fn execute(config: &RunnerConfig, args: RunArgs) -> Result<()> {
    let mut tests = args.tests;

    if let Some(file) = args.all_in {
        let path = config.project_root.join(&file);
        let titles = discovery::list_test_cases(&path)?;
        if titles.is_empty() {
            bail!("no test declarations found in {}", file);
        }
        tests.extend(titles.into_iter().map(|title| format!("{}::{}", file, title)));
    }

    let selection = Selection::parse(&tests)?;

    let events = EventChannel::default();
    let mut rx = events.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(line) => println!("{}", line),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let orchestrator = Orchestrator::new(config.clone(), events);
    let outcome = orchestrator.execute(selection).await?;
    printer.abort();

    let summary = &outcome.summary;
    println!();
    println!(
        "{} passed, {} failed, {} skipped ({} total, {:.0} ms)",
        summary.passed.to_string().green(),
        summary.failed.to_string().red(),
        summary.skipped.to_string().yellow(),
        summary.total,
        summary.total_duration,
    );
    println!("report: {}", outcome.report_path);

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
