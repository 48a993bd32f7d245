//! Run orchestrator
//!
//! Drives one run end to end: full store reset, file-by-file sequential
//! engine execution with per-file purge and artifact synthesis, then
//! collection, analytics, and report assembly. Execution is strictly
//! sequential because the engine and its browser share a single fixed
//! debugging endpoint.

use crate::analytics::{self, HistoryLog};
use crate::collector;
use crate::config::RunnerConfig;
use crate::engine;
use crate::events::{EventChannel, ProgressEvent};
use crate::report;
use testdeck_common::{
    Error, FileResult, RawTestRecord, Result, ResultArtifact, ResultStore, RunOutcome, Selection,
};
use tracing::{info, warn};

/// Orchestrates sequential test-file execution and the downstream
/// collection/analytics/report pipeline.
pub struct Orchestrator {
    config: RunnerConfig,
    store: ResultStore,
    events: EventChannel,
}

impl Orchestrator {
    pub fn new(config: RunnerConfig, events: EventChannel) -> Self {
        let store = ResultStore::new(&config.store_root);
        Self {
            config,
            store,
            events,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Execute one selection.
    ///
    /// Hard errors: an empty selection (rejected before any subprocess
    /// starts) and an unwritable store root. A crashing engine degrades
    /// to synthesized failures for that file only.
    pub async fn execute(&self, selection: Selection) -> Result<RunOutcome> {
        if selection.is_empty() {
            return Err(Error::EmptySelection);
        }

        self.store.init()?;
        self.store.reset()?;

        let groups = selection.group_by_file();
        info!(
            "starting run: {} file(s), {} test(s)",
            groups.len(),
            selection.len()
        );
        self.events.publish(ProgressEvent::RunStarted {
            files: groups.len(),
            tests: selection.len(),
        });

        for (file, names) in &groups {
            self.run_file(file, names).await?;
        }

        let records = collector::collect(&self.store);
        let history = HistoryLog::new(self.store.history_path());
        let (summary, snapshot) =
            analytics::analyze(&records, &history, self.config.slowest_limit);
        let report_path = report::write_report(&self.store, &summary, &records, &snapshot)?;

        self.events.publish(ProgressEvent::RunFinished {
            summary: summary.clone(),
        });

        Ok(RunOutcome {
            files_executed: groups.len(),
            summary,
            report_path: report_path.display().to_string(),
        })
    }

    /// Run one file group: purge, invoke the engine, synthesize on a
    /// missing artifact, emit the finish event.
    async fn run_file(&self, file: &str, names: &[String]) -> Result<()> {
        self.events.publish(ProgressEvent::FileStarted {
            file: file.to_string(),
        });

        let filter = name_filter(names);
        self.store.purge_file(file)?;

        let output = self.store.artifact_path(file);
        let engine_file = self.config.project_root.join(file).display().to_string();
        let invocation = engine::build_invocation(&self.config.engine, &engine_file, &filter, &output);

        let exit_code = match engine::run(&invocation, &self.events).await {
            Ok(code) => code,
            Err(e) => {
                warn!("engine failed for {}: {}", file, e);
                self.events.publish(ProgressEvent::EngineLine {
                    line: format!("engine error: {}", e),
                });
                None
            }
        };

        if !output.exists() {
            warn!(
                "no artifact produced for {}, synthesizing failure records",
                file
            );
            let artifact = synthesized_artifact(file, names, exit_code);
            self.store.write_artifact(file, &artifact)?;
        }

        self.events.publish(ProgressEvent::FileFinished {
            file: file.to_string(),
            exit_code,
        });

        Ok(())
    }
}

/// Build the engine's name-matching filter from the requested test names.
///
/// Names are escaped so special characters in test titles are matched
/// literally instead of corrupting the pattern.
pub fn name_filter(names: &[String]) -> String {
    names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|")
}

/// Artifact synthesized when the engine exits without producing output.
///
/// One failed record per requested name, so every requested test always
/// yields exactly one record even under total engine failure.
fn synthesized_artifact(file: &str, names: &[String], exit_code: Option<i32>) -> ResultArtifact {
    let exit_label = exit_code
        .map(|code| format!("exit code {}", code))
        .unwrap_or_else(|| "terminated by signal".to_string());

    let records = names
        .iter()
        .map(|name| RawTestRecord {
            title: name.clone(),
            status: "failed".to_string(),
            failure_messages: vec![format!(
                "test engine produced no result artifact ({})",
                exit_label
            )],
            invocations: Some(1),
            ..Default::default()
        })
        .collect();

    ResultArtifact {
        test_results: vec![FileResult {
            name: file.to_string(),
            assertion_results: records,
            start_time: None,
            end_time: None,
        }],
        ..Default::default()
    }
}
