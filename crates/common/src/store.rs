//! Result store
//!
//! Directory-tree-backed store of one JSON artifact per executed test
//! file. Layout: `<root>/results/<file-group>/<file-stem>/results.json`,
//! with the flakiness history log at `<root>/test-history.json` and the
//! assembled report under `<root>/report/`.

use crate::error::{Error, Result};
use crate::types::ResultArtifact;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File name of every per-file artifact leaf
pub const ARTIFACT_FILE: &str = "results.json";

/// File name of the rolling flakiness history log
pub const HISTORY_FILE: &str = "test-history.json";

/// File name of the assembled report document
pub const REPORT_FILE: &str = "index.html";

/// Handle on the store directory tree.
///
/// The store is the single durable source of truth for a run; canonical
/// records and analytics are always recomputed from it.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    pub fn report_dir(&self) -> PathBuf {
        self.root.join("report")
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_dir().join(REPORT_FILE)
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    /// Create the store tree and verify the root is actually writable.
    ///
    /// An unwritable root is one of the two structural failures that abort
    /// a run before any subprocess starts.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.results_dir()).map_err(|_| Error::StoreNotWritable {
            path: self.root.display().to_string(),
        })?;

        let probe = self.root.join(".write-probe");
        fs::write(&probe, b"ok").map_err(|_| Error::StoreNotWritable {
            path: self.root.display().to_string(),
        })?;
        let _ = fs::remove_file(&probe);

        Ok(())
    }

    /// Delete every pre-existing artifact and recreate the results tree.
    ///
    /// Called once before a run begins so stale results never leak into
    /// the new run.
    pub fn reset(&self) -> Result<()> {
        let results = self.results_dir();
        if results.exists() {
            fs::remove_dir_all(&results)?;
        }
        fs::create_dir_all(&results)?;
        debug!("result store reset at {}", results.display());
        Ok(())
    }

    /// Directory holding the artifact for one test file
    pub fn artifact_dir(&self, test_file: &str) -> PathBuf {
        let path = Path::new(test_file);
        let group = path
            .parent()
            .map(|p| p.display().to_string())
            .filter(|s| !s.is_empty())
            .map(|s| sanitize_segment(&s))
            .unwrap_or_else(|| "root".to_string());
        let stem = path
            .file_stem()
            .map(|s| sanitize_segment(&s.to_string_lossy()))
            .unwrap_or_else(|| "unnamed".to_string());
        self.results_dir().join(group).join(stem)
    }

    /// Expected artifact path for one test file
    pub fn artifact_path(&self, test_file: &str) -> PathBuf {
        self.artifact_dir(test_file).join(ARTIFACT_FILE)
    }

    /// Purge only one file's artifact subdirectory, then recreate it
    pub fn purge_file(&self, test_file: &str) -> Result<()> {
        let dir = self.artifact_dir(test_file);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(())
    }

    /// Write an artifact for one test file at its expected path
    pub fn write_artifact(&self, test_file: &str, artifact: &ResultArtifact) -> Result<()> {
        let path = self.artifact_path(test_file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(artifact)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Parse one artifact file
    pub fn read_artifact(&self, path: &Path) -> Result<ResultArtifact> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| Error::MalformedArtifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Walk the results tree and yield every artifact leaf path.
    ///
    /// Walking is decoupled from parsing so the two can be tested
    /// independently; unreadable directory entries are skipped with a
    /// warning rather than aborting the walk.
    pub fn walk_artifacts(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(self.results_dir()).follow_links(false) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file()
                        && entry.file_name().to_string_lossy() == ARTIFACT_FILE
                    {
                        paths.push(entry.into_path());
                    }
                }
                Err(e) => {
                    warn!("skipping unreadable store entry: {}", e);
                }
            }
        }
        paths.sort();
        paths
    }
}

/// Flatten a path-ish string into one safe directory segment
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileResult, RawTestRecord};
    use tempfile::TempDir;

    fn sample_artifact(file: &str) -> ResultArtifact {
        ResultArtifact {
            test_results: vec![FileResult {
                name: file.to_string(),
                assertion_results: vec![RawTestRecord {
                    title: "t1".to_string(),
                    status: "passed".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn layout_follows_group_and_stem() {
        let store = ResultStore::new("/store");
        let path = store.artifact_path("tests/auth/login.test.js");
        assert_eq!(
            path,
            PathBuf::from("/store/results/tests_auth/login.test/results.json")
        );
    }

    #[test]
    fn bare_file_lands_in_root_group() {
        let store = ResultStore::new("/store");
        let path = store.artifact_path("smoke.test.js");
        assert_eq!(
            path,
            PathBuf::from("/store/results/root/smoke.test/results.json")
        );
    }

    #[test]
    fn sanitize_strips_hostile_segments() {
        assert_eq!(sanitize_segment("../../etc"), ".._.._etc");
        assert_eq!(sanitize_segment("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_segment("///"), "root");
    }

    #[test]
    fn write_walk_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        store
            .write_artifact("a.test.js", &sample_artifact("a.test.js"))
            .unwrap();
        store
            .write_artifact("sub/b.test.js", &sample_artifact("sub/b.test.js"))
            .unwrap();

        let paths = store.walk_artifacts();
        assert_eq!(paths.len(), 2);

        for path in &paths {
            let artifact = store.read_artifact(path).unwrap();
            assert_eq!(artifact.test_results.len(), 1);
        }
    }

    #[test]
    fn reset_clears_previous_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        store
            .write_artifact("a.test.js", &sample_artifact("a.test.js"))
            .unwrap();
        assert_eq!(store.walk_artifacts().len(), 1);

        store.reset().unwrap();
        assert!(store.walk_artifacts().is_empty());
    }

    #[test]
    fn purge_file_only_touches_that_file() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        store
            .write_artifact("a.test.js", &sample_artifact("a.test.js"))
            .unwrap();
        store
            .write_artifact("b.test.js", &sample_artifact("b.test.js"))
            .unwrap();

        store.purge_file("a.test.js").unwrap();

        let paths = store.walk_artifacts();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("root/b.test/results.json"));
    }

    #[test]
    fn malformed_artifact_reports_path() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.init().unwrap();

        let bad = store.results_dir().join("root/bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join(ARTIFACT_FILE), b"{not json").unwrap();

        let paths = store.walk_artifacts();
        assert_eq!(paths.len(), 1);
        let err = store.read_artifact(&paths[0]).unwrap_err();
        assert!(matches!(err, Error::MalformedArtifact { .. }));
    }
}
