//! Core types for testdeck

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// One requested (file, test name) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub file: String,
    pub test_name: String,
}

/// The user-chosen set of tests to execute in one run.
///
/// Entries keep their submission order; grouping by file preserves the
/// order in which each file was first encountered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub entries: Vec<SelectionEntry>,
}

impl Selection {
    /// Build a selection from `"filePath::testName"` strings.
    ///
    /// Rejects empty input and entries without the `::` separator.
    pub fn parse(tests: &[String]) -> crate::Result<Self> {
        if tests.is_empty() {
            return Err(crate::Error::EmptySelection);
        }

        let mut entries = Vec::with_capacity(tests.len());
        for raw in tests {
            let Some((file, name)) = raw.split_once("::") else {
                return Err(crate::Error::InvalidSelection(format!(
                    "expected filePath::testName, got {:?}",
                    raw
                )));
            };
            if file.is_empty() || name.is_empty() {
                return Err(crate::Error::InvalidSelection(format!(
                    "empty file or test name in {:?}",
                    raw
                )));
            }
            entries.push(SelectionEntry {
                file: file.to_string(),
                test_name: name.to_string(),
            });
        }

        Ok(Self { entries })
    }

    /// Group entries by file, preserving first-encounter order of files
    /// and submission order of test names within each file.
    pub fn group_by_file(&self) -> Vec<(String, Vec<String>)> {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for entry in &self.entries {
            match groups.iter_mut().find(|(file, _)| *file == entry.file) {
                Some((_, names)) => {
                    if !names.contains(&entry.test_name) {
                        names.push(entry.test_name.clone());
                    }
                }
                None => groups.push((entry.file.clone(), vec![entry.test_name.clone()])),
            }
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical test status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Unknown,
}

impl TestStatus {
    /// Map a vendor status label onto the canonical set.
    ///
    /// This is the single source of truth for status vocabulary; every
    /// consumer goes through here.
    pub fn canonicalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" | "success" => Self::Passed,
            "failed" | "fail" | "error" => Self::Failed,
            "skipped" | "skip" | "pending" | "todo" => Self::Skipped,
            _ => Self::Unknown,
        }
    }
}

impl Default for TestStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Skipped => write!(f, "skipped"),
            TestStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A named sub-operation timing within one test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTiming {
    pub name: String,
    #[serde(default)]
    pub duration: f64,
}

/// One raw record as emitted by the test engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTestRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub failure_messages: Vec<String>,
    /// Engine-side invocation counter; retries = invocations - 1
    #[serde(default)]
    pub invocations: Option<u32>,
    /// Present when a per-test reporter captured this record individually,
    /// absent on suite-level rollups
    #[serde(default)]
    pub individual_test: Option<bool>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub steps: Vec<StepTiming>,
}

/// Per-file block of engine output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    /// Path of the test file this block covers
    #[serde(default, alias = "testFilePath")]
    pub name: String,
    #[serde(default, alias = "testResults")]
    pub assertion_results: Vec<RawTestRecord>,
    /// File-level timing window (epoch ms)
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

/// The raw JSON artifact produced by one test-file execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultArtifact {
    #[serde(default)]
    pub test_results: Vec<FileResult>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub framework_version: Option<String>,
}

/// Provenance attached to every canonical record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub framework: String,
    pub version: String,
    pub platform: String,
}

/// The normalized, deduplicated unit of truth.
///
/// At most one record exists per (source_file, test_name) pair after
/// collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTestRecord {
    pub id: String,
    pub test_name: String,
    pub description: String,
    pub status: TestStatus,
    /// Milliseconds, clamped to >= 0
    pub duration: f64,
    /// RFC 3339 timestamp of the record's timing window start
    pub timestamp: String,
    pub browser: String,
    pub environment: String,
    pub tags: Vec<String>,
    pub screenshots: Vec<String>,
    pub logs: Vec<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub source_file: String,
    pub metadata: RecordMetadata,
    #[serde(default)]
    pub steps: Vec<StepTiming>,
    /// True when a per-test reporter captured this record individually
    #[serde(default)]
    pub individual_capture: bool,
}

impl CanonicalTestRecord {
    pub fn new(test_name: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_name: test_name.into(),
            description: String::new(),
            status: TestStatus::Unknown,
            duration: 0.0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            browser: String::new(),
            environment: String::new(),
            tags: Vec::new(),
            screenshots: Vec::new(),
            logs: Vec::new(),
            error: None,
            retry_count: 0,
            source_file: source_file.into(),
            metadata: RecordMetadata::default(),
            steps: Vec::new(),
            individual_capture: false,
        }
    }
}

/// Aggregate counts over a canonical record set.
///
/// Unknown statuses count toward `total` only, so
/// `passed + failed + skipped <= total` always holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Milliseconds
    pub total_duration: f64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub browsers: BTreeSet<String>,
    pub environments: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

/// Flakiness severity buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlakySeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for FlakySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlakySeverity::Low => write!(f, "low"),
            FlakySeverity::Medium => write!(f, "medium"),
            FlakySeverity::High => write!(f, "high"),
        }
    }
}

/// One flagged flaky test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakyTest {
    pub test_name: String,
    pub source_file: String,
    pub severity: FlakySeverity,
    pub reasons: Vec<String>,
}

/// One entry in the slowest-tests ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowTest {
    pub test_name: String,
    pub source_file: String,
    /// Milliseconds
    pub duration: f64,
    /// Longest sub-operation, or the test name when no step timings exist
    pub longest_step: String,
}

/// Derived, non-persisted view over the canonical record set.
///
/// Resource figures are sampled from the process running the analysis, not
/// from the subprocess that executed the tests; `provenance` carries that
/// caveat into the report, and metrics unavailable on the current platform
/// stay `None` instead of being fabricated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub flaky_tests: Vec<FlakyTest>,
    pub slowest_tests: Vec<SlowTest>,
    /// Milliseconds
    pub average_duration: f64,
    /// Resident set size of the analyzing process, in KB
    pub memory_rss_kb: Option<u64>,
    /// 1-minute system load average
    pub load_average: Option<f64>,
    /// Network throughput indicator; no measurement source exists here
    pub network_throughput: Option<f64>,
    /// Execution is strictly sequential, so this is always 1 for runs
    /// produced by the orchestrator
    pub parallel_workers: u32,
    pub provenance: String,
}

/// Outcome of one orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub files_executed: usize,
    pub summary: Summary,
    pub report_path: String,
}
