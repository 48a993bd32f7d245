//! Live progress broadcast
//!
//! Fans orchestrator progress out to any number of attached viewers.
//! Viewers are read-only; nothing they send flows back into orchestration
//! state. A slow viewer may lose lines (broadcast is lossy by design), but
//! the completion marker and the final report remain authoritative.

use testdeck_common::Summary;
use tokio::sync::broadcast;

/// Literal marker carried by the final line of a run's progress stream.
/// Consumers stop expecting further lines once they see it.
pub const RUN_COMPLETE_MARKER: &str = "=== RUN COMPLETE ===";

/// Progress events emitted during a run
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A run was accepted and is about to execute
    RunStarted { files: usize, tests: usize },
    /// One file's subprocess is starting
    FileStarted { file: String },
    /// A raw stdout/stderr line from the engine subprocess
    EngineLine { line: String },
    /// One file's subprocess exited
    FileFinished { file: String, exit_code: Option<i32> },
    /// The whole run finished, including collection and report assembly
    RunFinished { summary: Summary },
}

impl ProgressEvent {
    /// Render the event as the plain text line viewers receive
    pub fn to_line(&self) -> String {
        match self {
            ProgressEvent::RunStarted { files, tests } => {
                format!("[run] starting {} file(s), {} test(s)", files, tests)
            }
            ProgressEvent::FileStarted { file } => format!("[file] running {}", file),
            ProgressEvent::EngineLine { line } => line.clone(),
            ProgressEvent::FileFinished { file, exit_code } => match exit_code {
                Some(code) => format!("[file] finished {} (exit code {})", file, code),
                None => format!("[file] finished {} (terminated by signal)", file),
            },
            ProgressEvent::RunFinished { summary } => format!(
                "{} passed={} failed={} skipped={} total={}",
                RUN_COMPLETE_MARKER,
                summary.passed,
                summary.failed,
                summary.skipped,
                summary.total
            ),
        }
    }
}

/// Fan-out channel for progress lines
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<String>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attach a new viewer
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Publish one event to all attached viewers.
    ///
    /// Sending with no viewers attached is not an error.
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event.to_line());
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_line_contains_marker_and_counts() {
        let summary = Summary {
            total: 5,
            passed: 3,
            failed: 1,
            skipped: 1,
            ..Default::default()
        };
        let line = ProgressEvent::RunFinished { summary }.to_line();
        assert!(line.contains(RUN_COMPLETE_MARKER));
        assert!(line.contains("passed=3"));
        assert!(line.contains("total=5"));
    }

    #[tokio::test]
    async fn all_subscribers_see_published_lines() {
        let channel = EventChannel::new(16);
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        channel.publish(ProgressEvent::FileStarted {
            file: "a.test.js".to_string(),
        });

        assert_eq!(a.recv().await.unwrap(), "[file] running a.test.js");
        assert_eq!(b.recv().await.unwrap(), "[file] running a.test.js");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let channel = EventChannel::new(16);
        channel.publish(ProgressEvent::EngineLine {
            line: "nobody listening".to_string(),
        });
    }
}
