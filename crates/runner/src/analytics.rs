//! Analytics engine
//!
//! Derives the run summary and analytics snapshot from a canonical record
//! set. Everything here is a pure function of the records plus the rolling
//! history log; nothing is persisted as a source of truth.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use testdeck_common::{
    AnalyticsSnapshot, CanonicalTestRecord, FlakySeverity, FlakyTest, SlowTest, Summary,
    TestStatus,
};
use tracing::warn;

/// Test names matching these keywords tend to exercise timing-sensitive
/// or network-dependent behavior
static VOLATILITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(timeout|retry|retries|network|async|wait|race|poll|polling|animation|debounce|throttle|flaky|intermittent)\b",
    )
    .expect("volatility pattern is valid")
});

/// Flakiness history bounds: a rolling pass rate strictly inside this
/// window marks a test flaky
const HISTORY_FLAKY_LOW: f64 = 0.10;
const HISTORY_FLAKY_HIGH: f64 = 0.90;

/// Most recent entries kept per test name
const HISTORY_CAP: usize = 20;

/// Derive summary and snapshot in one call.
///
/// History handling is read-then-append: the pass-rate check uses the log
/// as it stood before this analysis, then the current outcomes are
/// appended for future runs. History I/O failures degrade to "no history".
pub fn analyze(
    records: &[CanonicalTestRecord],
    history: &HistoryLog,
    slowest_limit: usize,
) -> (Summary, AnalyticsSnapshot) {
    let summary = summarize(records);

    let past = history.read();
    let snapshot = AnalyticsSnapshot {
        flaky_tests: find_flaky(records, &past),
        slowest_tests: rank_slowest(records, slowest_limit),
        average_duration: mean_duration(records),
        memory_rss_kb: read_rss_kb(),
        load_average: read_load_average(),
        network_throughput: None,
        parallel_workers: 1,
        provenance: "resource figures sampled from the reporting process at analysis time, \
                     not from the test subprocess"
            .to_string(),
    };
    history.append(records);

    (summary, snapshot)
}

/// Single pass over the record set.
///
/// Unknown statuses are excluded from the three buckets but counted in
/// `total`, so `passed + failed + skipped <= total`.
pub fn summarize(records: &[CanonicalTestRecord]) -> Summary {
    let mut summary = Summary::default();
    let mut window_start: Option<DateTime<Utc>> = None;
    let mut window_end: Option<DateTime<Utc>> = None;

    for record in records {
        summary.total += 1;
        match record.status {
            TestStatus::Passed => summary.passed += 1,
            TestStatus::Failed => summary.failed += 1,
            TestStatus::Skipped => summary.skipped += 1,
            TestStatus::Unknown => {}
        }
        summary.total_duration += record.duration;

        if !record.browser.is_empty() {
            summary.browsers.insert(record.browser.clone());
        }
        if !record.environment.is_empty() {
            summary.environments.insert(record.environment.clone());
        }
        for tag in &record.tags {
            summary.tags.insert(tag.clone());
        }

        if let Ok(start) = DateTime::parse_from_rfc3339(&record.timestamp) {
            let start = start.with_timezone(&Utc);
            let end = start + Duration::milliseconds(record.duration as i64);
            window_start = Some(window_start.map_or(start, |s| s.min(start)));
            window_end = Some(window_end.map_or(end, |e| e.max(end)));
        }
    }

    summary.start_time = window_start.map(|t| t.to_rfc3339());
    summary.end_time = window_end.map(|t| t.to_rfc3339());
    summary
}

fn mean_duration(records: &[CanonicalTestRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.duration).sum::<f64>() / records.len() as f64
}

/// Flag flaky records via retries, name heuristics, and rolling history
fn find_flaky(
    records: &[CanonicalTestRecord],
    history: &HashMap<String, Vec<bool>>,
) -> Vec<FlakyTest> {
    let mut flagged = Vec::new();

    for record in records {
        let mut reasons = Vec::new();
        let mut severity = FlakySeverity::Low;

        if record.retry_count > 0 {
            reasons.push(format!("retried {} time(s)", record.retry_count));
            severity = FlakySeverity::Medium;
        }

        if VOLATILITY_PATTERN.is_match(&record.test_name) {
            reasons.push("name matches a volatility keyword".to_string());
        }

        if let Some(entries) = history.get(&record.test_name) {
            if !entries.is_empty() {
                let passes = entries.iter().filter(|passed| **passed).count();
                let rate = passes as f64 / entries.len() as f64;
                if rate > HISTORY_FLAKY_LOW && rate < HISTORY_FLAKY_HIGH {
                    reasons.push(format!(
                        "historical pass rate {:.0}% over {} run(s)",
                        rate * 100.0,
                        entries.len()
                    ));
                    severity = FlakySeverity::High;
                }
            }
        }

        if reasons.is_empty() {
            continue;
        }
        if reasons.len() >= 2 {
            severity = FlakySeverity::High;
        }

        flagged.push(FlakyTest {
            test_name: record.test_name.clone(),
            source_file: record.source_file.clone(),
            severity,
            reasons,
        });
    }

    flagged
}

/// Top-N ranking by duration, descending
fn rank_slowest(records: &[CanonicalTestRecord], limit: usize) -> Vec<SlowTest> {
    let mut ranked: Vec<&CanonicalTestRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        b.duration
            .partial_cmp(&a.duration)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|record| SlowTest {
            test_name: record.test_name.clone(),
            source_file: record.source_file.clone(),
            duration: record.duration,
            longest_step: record
                .steps
                .iter()
                .max_by(|a, b| {
                    a.duration
                        .partial_cmp(&b.duration)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|step| step.name.clone())
                .unwrap_or_else(|| record.test_name.clone()),
        })
        .collect()
}

/// Rolling per-test-name pass/fail history.
///
/// Append-only JSON map at `<store-root>/test-history.json`, capped at the
/// most recent entries per name. All I/O is best-effort: a broken log
/// degrades flakiness detection to the heuristics, never aborts analysis.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Read the log as it currently stands; failures yield an empty map
    pub fn read(&self) -> HashMap<String, Vec<bool>> {
        let _guard = self.lock.lock();
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!("unreadable test history, continuing without it: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        }
    }

    /// Append this run's outcomes, dropping entries past the cap.
    ///
    /// Skipped and unknown records carry no pass/fail signal and are not
    /// recorded.
    pub fn append(&self, records: &[CanonicalTestRecord]) {
        let mut map = self.read();
        let _guard = self.lock.lock();

        for record in records {
            let passed = match record.status {
                TestStatus::Passed => true,
                TestStatus::Failed => false,
                TestStatus::Skipped | TestStatus::Unknown => continue,
            };
            let entries = map.entry(record.test_name.clone()).or_default();
            entries.push(passed);
            if entries.len() > HISTORY_CAP {
                let excess = entries.len() - HISTORY_CAP;
                entries.drain(..excess);
            }
        }

        let json = match serde_json::to_string_pretty(&map) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize test history: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!("failed to write test history: {}", e);
        }
    }
}

/// Resident set size of this process in KB, from /proc
fn read_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse::<u64>()
                .ok();
        }
    }
    None
}

/// 1-minute load average, from /proc
fn read_load_average() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    loadavg.split_whitespace().next()?.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, status: TestStatus, duration: f64) -> CanonicalTestRecord {
        let mut record = CanonicalTestRecord::new(name, "a.test.js");
        record.status = status;
        record.duration = duration;
        record
    }

    #[test]
    fn summary_counts_respect_unknown_bucket() {
        let records = vec![
            record("p", TestStatus::Passed, 10.0),
            record("f", TestStatus::Failed, 20.0),
            record("s", TestStatus::Skipped, 0.0),
            record("u", TestStatus::Unknown, 5.0),
        ];

        let summary = summarize(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.passed + summary.failed + summary.skipped <= summary.total);
        assert_eq!(summary.total_duration, 35.0);
    }

    #[test]
    fn empty_record_set_yields_zero_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.passed, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.total_duration, 0.0);
        assert!(summary.start_time.is_none());
    }

    #[test]
    fn retries_and_keywords_flag_flaky() {
        let mut retried = record("stable name", TestStatus::Passed, 1.0);
        retried.retry_count = 2;
        let keyword = record("waits for network idle", TestStatus::Passed, 1.0);
        let calm = record("renders header", TestStatus::Passed, 1.0);

        let flagged = find_flaky(&[retried, keyword, calm], &HashMap::new());
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[0].test_name, "stable name");
        assert_eq!(flagged[0].severity, FlakySeverity::Medium);
        assert_eq!(flagged[1].test_name, "waits for network idle");
        assert_eq!(flagged[1].severity, FlakySeverity::Low);
    }

    #[test]
    fn mid_band_history_rate_is_high_severity() {
        let mut history = HashMap::new();
        history.insert("t".to_string(), vec![true, false, true, false]);

        let flagged = find_flaky(&[record("t", TestStatus::Passed, 1.0)], &history);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].severity, FlakySeverity::High);
    }

    #[test]
    fn extreme_history_rates_are_not_flaky() {
        let mut history = HashMap::new();
        history.insert("always".to_string(), vec![true; 10]);
        history.insert("never".to_string(), vec![false; 10]);

        let records = vec![
            record("always", TestStatus::Passed, 1.0),
            record("never", TestStatus::Failed, 1.0),
        ];
        assert!(find_flaky(&records, &history).is_empty());
    }

    #[test]
    fn slowest_ranking_sorts_descending_with_step_fallback() {
        let mut stepped = record("with steps", TestStatus::Passed, 500.0);
        stepped.steps = vec![
            testdeck_common::StepTiming {
                name: "navigate".to_string(),
                duration: 120.0,
            },
            testdeck_common::StepTiming {
                name: "screenshot".to_string(),
                duration: 340.0,
            },
        ];
        let plain = record("plain", TestStatus::Passed, 900.0);

        let ranked = rank_slowest(&[stepped, plain], 10);
        assert_eq!(ranked[0].test_name, "plain");
        assert_eq!(ranked[0].longest_step, "plain");
        assert_eq!(ranked[1].longest_step, "screenshot");
    }

    #[test]
    fn history_caps_at_most_recent_entries() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path().join("test-history.json"));

        for _ in 0..25 {
            log.append(&[record("t", TestStatus::Passed, 1.0)]);
        }
        log.append(&[record("t", TestStatus::Failed, 1.0)]);

        let map = log.read();
        let entries = &map["t"];
        assert_eq!(entries.len(), 20);
        assert_eq!(entries.last(), Some(&false));
    }

    #[test]
    fn unreadable_history_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test-history.json");
        std::fs::write(&path, b"{{{{").unwrap();

        let log = HistoryLog::new(&path);
        assert!(log.read().is_empty());
    }

    #[test]
    fn analyze_never_fabricates_resource_figures() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path().join("test-history.json"));

        let (_, snapshot) = analyze(&[], &log, 10);
        assert!(snapshot.network_throughput.is_none());
        assert_eq!(snapshot.parallel_workers, 1);
        assert!(!snapshot.provenance.is_empty());
    }
}
