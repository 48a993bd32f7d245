//! Report Command

use anyhow::Result;
use testdeck_common::ResultStore;
use testdeck_runner::analytics::{self, HistoryLog};
use testdeck_runner::{collector, report, RunnerConfig};

/// Recompute the canonical record set from the store and rebuild the
/// report document in place.
pub fn execute(config: &RunnerConfig) -> Result<()> {
    let store = ResultStore::new(&config.store_root);
    store.init()?;

    let records = collector::collect(&store);
    let history = HistoryLog::new(store.history_path());
    let (summary, snapshot) = analytics::analyze(&records, &history, config.slowest_limit);
    let path = report::write_report(&store, &summary, &records, &snapshot)?;

    println!(
        "report assembled from {} record(s): {}",
        summary.total,
        path.display()
    );
    Ok(())
}
