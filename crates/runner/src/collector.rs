//! Deduplicating collector
//!
//! Scans the result store, parses every artifact, flattens raw engine
//! records into canonical records, and resolves duplicate
//! (source file, test name) pairs to a single survivor by priority.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use testdeck_common::{
    CanonicalTestRecord, FileResult, RawTestRecord, RecordMetadata, ResultArtifact, ResultStore,
    TestStatus,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Collect the canonical record set from everything currently in the store.
///
/// Malformed artifacts are logged and skipped; they never abort the whole
/// collection. The result is deterministic for an unchanged store: record
/// ids derive from (source file, test name) and artifact paths are walked
/// in sorted order.
pub fn collect(store: &ResultStore) -> Vec<CanonicalTestRecord> {
    let mut flattened = Vec::new();

    for path in store.walk_artifacts() {
        match store.read_artifact(&path) {
            Ok(artifact) => flatten_artifact(&artifact, &path, &mut flattened),
            Err(e) => warn!("skipping malformed artifact: {}", e),
        }
    }

    let records = dedupe(flattened);
    debug!("collected {} canonical record(s)", records.len());
    records
}

/// Flatten one artifact's nested per-file assertion results
fn flatten_artifact(
    artifact: &ResultArtifact,
    artifact_path: &Path,
    out: &mut Vec<CanonicalTestRecord>,
) {
    let fallback_timestamp = file_mtime_rfc3339(artifact_path);

    for file_result in &artifact.test_results {
        for raw in &file_result.assertion_results {
            out.push(canonicalize_record(
                raw,
                file_result,
                artifact,
                &fallback_timestamp,
            ));
        }
    }
}

/// Map one raw engine record onto the canonical schema
fn canonicalize_record(
    raw: &RawTestRecord,
    file_result: &FileResult,
    artifact: &ResultArtifact,
    fallback_timestamp: &str,
) -> CanonicalTestRecord {
    let source_file = file_result.name.clone();
    let test_name = raw.title.clone();

    let timestamp = file_result
        .start_time
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| fallback_timestamp.to_string());

    let error = if raw.failure_messages.is_empty() {
        None
    } else {
        Some(raw.failure_messages.join("\n"))
    };

    CanonicalTestRecord {
        id: record_id(&source_file, &test_name),
        description: raw.full_name.clone().unwrap_or_else(|| test_name.clone()),
        test_name,
        status: TestStatus::canonicalize(&raw.status),
        duration: raw.duration.unwrap_or(0.0).max(0.0),
        timestamp,
        browser: artifact.browser.clone().unwrap_or_default(),
        environment: artifact.environment.clone().unwrap_or_default(),
        tags: raw.tags.clone(),
        screenshots: raw.screenshots.clone(),
        logs: raw.logs.clone(),
        error,
        retry_count: raw.invocations.unwrap_or(1).saturating_sub(1),
        source_file,
        metadata: RecordMetadata {
            framework: artifact.framework.clone().unwrap_or_default(),
            version: artifact.framework_version.clone().unwrap_or_default(),
            platform: std::env::consts::OS.to_string(),
        },
        steps: raw.steps.clone(),
        individual_capture: raw.individual_test.unwrap_or(false),
    }
}

/// Deterministic opaque id per (source file, test name)
fn record_id(source_file: &str, test_name: &str) -> String {
    let key = format!("{}::{}", source_file, test_name);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

fn file_mtime_rfc3339(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH.to_rfc3339())
}

/// Resolution priority for duplicate records, highest wins.
///
/// An individually-captured record with a console trace is the richest
/// producer output; a suite-level rollup without logs is the poorest.
fn priority(record: &CanonicalTestRecord) -> u8 {
    match (record.individual_capture, !record.logs.is_empty()) {
        (true, true) => 4,
        (true, false) => 3,
        (false, true) => 2,
        (false, false) => 1,
    }
}

/// Keep exactly one survivor per (source file, test name) group.
///
/// Ties resolve to the earliest member in walk order, so resolution is
/// deterministic and idempotent.
fn dedupe(flattened: Vec<CanonicalTestRecord>) -> Vec<CanonicalTestRecord> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut survivors: HashMap<(String, String), CanonicalTestRecord> = HashMap::new();

    for record in flattened {
        let key = (record.source_file.clone(), record.test_name.clone());
        match survivors.get(&key) {
            Some(existing) => {
                if priority(&record) > priority(existing) {
                    survivors.insert(key, record);
                }
            }
            None => {
                order.push(key.clone());
                survivors.insert(key, record);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| survivors.remove(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdeck_common::ResultStore;
    use tempfile::TempDir;

    fn raw(title: &str, status: &str) -> RawTestRecord {
        RawTestRecord {
            title: title.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    fn artifact_with(file: &str, records: Vec<RawTestRecord>) -> ResultArtifact {
        ResultArtifact {
            test_results: vec![FileResult {
                name: file.to_string(),
                assertion_results: records,
                start_time: Some(1_700_000_000_000),
                end_time: Some(1_700_000_004_000),
            }],
            browser: Some("chromium".to_string()),
            framework: Some("jest".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn flattening_maps_statuses_and_retries() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        let mut pending = raw("slow one", "pending");
        pending.invocations = Some(3);
        let mut vendor = raw("odd one", "quarantined");
        vendor.duration = Some(-5.0);

        store
            .write_artifact(
                "a.test.js",
                &artifact_with("a.test.js", vec![raw("ok", "passed"), pending, vendor]),
            )
            .unwrap();

        let records = collect(&store);
        assert_eq!(records.len(), 3);

        let by_name: HashMap<_, _> = records.iter().map(|r| (r.test_name.as_str(), r)).collect();
        assert_eq!(by_name["ok"].status, TestStatus::Passed);
        assert_eq!(by_name["slow one"].status, TestStatus::Skipped);
        assert_eq!(by_name["slow one"].retry_count, 2);
        assert_eq!(by_name["odd one"].status, TestStatus::Unknown);
        assert_eq!(by_name["odd one"].duration, 0.0);
        assert_eq!(by_name["ok"].browser, "chromium");
    }

    #[test]
    fn malformed_artifacts_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        store
            .write_artifact("a.test.js", &artifact_with("a.test.js", vec![raw("ok", "passed")]))
            .unwrap();

        let bad_dir = store.results_dir().join("root/broken");
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join("results.json"), b"not json at all").unwrap();

        let records = collect(&store);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_name, "ok");
    }

    #[test]
    fn individual_record_without_logs_beats_suite_record_with_logs() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        let mut suite = raw("login works", "passed");
        suite.logs = vec!["console: hello".to_string()];
        let mut individual = raw("login works", "failed");
        individual.individual_test = Some(true);

        store
            .write_artifact(
                "login.test.js",
                &artifact_with("login.test.js", vec![suite, individual]),
            )
            .unwrap();

        let records = collect(&store);
        assert_eq!(records.len(), 1);
        assert!(records[0].individual_capture);
        assert_eq!(records[0].status, TestStatus::Failed);
    }

    #[test]
    fn richest_record_wins_and_order_is_first_encounter() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        let mut best = raw("t", "passed");
        best.individual_test = Some(true);
        best.logs = vec!["trace".to_string()];

        store
            .write_artifact(
                "a.test.js",
                &artifact_with(
                    "a.test.js",
                    vec![raw("first", "passed"), raw("t", "failed"), best],
                ),
            )
            .unwrap();

        let records = collect(&store);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].test_name, "first");
        assert_eq!(records[1].test_name, "t");
        assert_eq!(records[1].status, TestStatus::Passed);
        assert_eq!(records[1].logs, vec!["trace".to_string()]);
    }

    #[test]
    fn collection_is_idempotent_over_an_unchanged_store() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        store
            .write_artifact(
                "a.test.js",
                &artifact_with("a.test.js", vec![raw("t1", "passed"), raw("t2", "failed")]),
            )
            .unwrap();

        let first = collect(&store);
        let second = collect(&store);

        let a = serde_json::to_string(&first).unwrap();
        let b = serde_json::to_string(&second).unwrap();
        assert_eq!(a, b);
    }
}
