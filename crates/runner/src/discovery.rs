//! Test discovery
//!
//! Finds test files under the project root and lists the test-case titles
//! a file declares. Title listing is a lightweight pattern scan over the
//! source text, not a parse; it locates `test(...)` / `it(...)` call
//! sites in declaration order.

use crate::config::RunnerConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use testdeck_common::{Error, Result};
use walkdir::WalkDir;

/// Matches test-declaration call sites with a single- or double-quoted or
/// backtick title, tolerating modifier chains like `test.skip(...)`
static TEST_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)\b(?:test|it)(?:\.\w+)*\s*\(\s*(?:'((?:\\.|[^'\\])*)'|"((?:\\.|[^"\\])*)"|`((?:\\.|[^`\\])*)`)"#,
    )
    .expect("test declaration pattern is valid")
});

/// List all test files under the project root, as sorted paths relative
/// to it. The store root and configured directories are excluded.
pub fn list_test_files(config: &RunnerConfig) -> Vec<String> {
    let store_root = &config.store_root;
    let mut files = Vec::new();

    let walker = WalkDir::new(&config.project_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.path() == store_root.as_path() || entry.path().starts_with(store_root) {
                return false;
            }
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                return !config
                    .discovery
                    .exclude_dirs
                    .iter()
                    .any(|excluded| name.as_ref() == excluded);
            }
            true
        });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !config
            .discovery
            .test_file_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&config.project_root)
            .unwrap_or(entry.path());
        files.push(relative.display().to_string());
    }

    files.sort();
    files
}

/// List the test-case titles declared in one file, in declaration order
pub fn list_test_cases(path: &Path) -> Result<Vec<String>> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        Error::Discovery(format!("cannot read {}: {}", path.display(), e))
    })?;

    let mut titles = Vec::new();
    for capture in TEST_DECLARATION.captures_iter(&source) {
        let raw = capture
            .get(1)
            .or_else(|| capture.get(2))
            .or_else(|| capture.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        titles.push(unescape_title(raw));
    }
    Ok(titles)
}

/// Undo source-level escaping inside a scanned title
fn unescape_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
