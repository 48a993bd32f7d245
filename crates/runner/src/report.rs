//! Report assembler
//!
//! Renders the canonical record set, summary, and analytics snapshot into
//! one self-contained HTML document with embedded data and client-side
//! filtering. The document is viewable offline; nothing is fetched at
//! view time. All user-sourced text passes through the escaping helpers
//! before it reaches markup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use testdeck_common::{
    AnalyticsSnapshot, CanonicalTestRecord, Error, Result, ResultStore, Summary, VERSION,
};
use tracing::{error, info};

/// Longest inline failure excerpt, in characters
const ERROR_EXCERPT_LIMIT: usize = 300;

/// The serializable model embedded in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub generated_at: String,
    pub version: String,
    pub summary: Summary,
    pub records: Vec<CanonicalTestRecord>,
    pub analytics: AnalyticsSnapshot,
}

/// Proportional widths of the status bar segments.
///
/// Guarded against a zero total: every segment is 0% and no division
/// happens. Otherwise the four segments sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusBarWidths {
    pub passed: f64,
    pub failed: f64,
    pub skipped: f64,
    pub unknown: f64,
}

impl StatusBarWidths {
    pub fn from_summary(summary: &Summary) -> Self {
        if summary.total == 0 {
            return Self {
                passed: 0.0,
                failed: 0.0,
                skipped: 0.0,
                unknown: 0.0,
            };
        }
        let total = summary.total as f64;
        let passed = summary.passed as f64 / total * 100.0;
        let failed = summary.failed as f64 / total * 100.0;
        let skipped = summary.skipped as f64 / total * 100.0;
        Self {
            passed,
            failed,
            skipped,
            unknown: 100.0 - passed - failed - skipped,
        }
    }

    pub fn sum(&self) -> f64 {
        self.passed + self.failed + self.skipped + self.unknown
    }
}

/// Escape text for HTML element and attribute context
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize the data model for embedding inside a script element.
///
/// `</` is escaped so user-sourced text can never terminate the script
/// block early.
fn embed_json(data: &ReportData) -> Result<String> {
    let json = serde_json::to_string(data)?;
    Ok(json.replace("</", "<\\/"))
}

/// Assemble the full document from a serializable data model
pub fn assemble_document(data: &ReportData) -> Result<String> {
    let widths = StatusBarWidths::from_summary(&data.summary);
    let embedded = embed_json(data)?;

    let mut rows = String::new();
    for record in &data.records {
        push_record_row(&mut rows, record);
    }

    let mut flaky_items = String::new();
    for flaky in &data.analytics.flaky_tests {
        flaky_items.push_str(&format!(
            "<li><span class=\"sev sev-{sev}\">{sev}</span> <strong>{name}</strong> \
             <span class=\"muted\">{file}</span> &mdash; {reasons}</li>\n",
            sev = flaky.severity,
            name = escape_html(&flaky.test_name),
            file = escape_html(&flaky.source_file),
            reasons = escape_html(&flaky.reasons.join("; ")),
        ));
    }
    if flaky_items.is_empty() {
        flaky_items.push_str("<li class=\"muted\">No flaky tests detected.</li>\n");
    }

    let mut slow_rows = String::new();
    for slow in &data.analytics.slowest_tests {
        slow_rows.push_str(&format!(
            "<tr><td>{}</td><td class=\"muted\">{}</td><td>{:.0} ms</td><td>{}</td></tr>\n",
            escape_html(&slow.test_name),
            escape_html(&slow.source_file),
            slow.duration,
            escape_html(&slow.longest_step),
        ));
    }

    let rss = data
        .analytics
        .memory_rss_kb
        .map(|kb| format!("{:.1} MB", kb as f64 / 1024.0))
        .unwrap_or_else(|| "unavailable".to_string());
    let load = data
        .analytics
        .load_average
        .map(|l| format!("{:.2}", l))
        .unwrap_or_else(|| "unavailable".to_string());
    let network = data
        .analytics
        .network_throughput
        .map(|n| format!("{:.2}", n))
        .unwrap_or_else(|| "unavailable".to_string());

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>testdeck report</title>
<style>
  body {{ font-family: -apple-system, "Segoe UI", sans-serif; margin: 0; background: #f5f6f8; color: #1e2430; }}
  header {{ background: #1e2430; color: #fff; padding: 16px 24px; }}
  header .muted {{ color: #9aa3b2; font-size: 13px; }}
  main {{ padding: 24px; max-width: 1100px; margin: 0 auto; }}
  .cards {{ display: flex; gap: 12px; flex-wrap: wrap; }}
  .card {{ background: #fff; border-radius: 8px; padding: 14px 20px; min-width: 110px; box-shadow: 0 1px 2px rgba(0,0,0,.08); }}
  .card .num {{ font-size: 26px; font-weight: 600; }}
  .bar {{ display: flex; height: 12px; border-radius: 6px; overflow: hidden; margin: 18px 0; background: #e1e4ea; }}
  .bar .seg-passed {{ background: #2fa463; }}
  .bar .seg-failed {{ background: #d64545; }}
  .bar .seg-skipped {{ background: #d9a013; }}
  .bar .seg-unknown {{ background: #8b93a3; }}
  .controls {{ margin: 12px 0; display: flex; gap: 8px; flex-wrap: wrap; }}
  .controls button {{ border: 1px solid #c6ccd6; background: #fff; border-radius: 6px; padding: 6px 12px; cursor: pointer; }}
  .controls button.active {{ background: #1e2430; color: #fff; }}
  .controls input {{ flex: 1; min-width: 200px; border: 1px solid #c6ccd6; border-radius: 6px; padding: 6px 10px; }}
  .tabs {{ margin: 18px 0 8px; border-bottom: 2px solid #c6ccd6; }}
  .tabs button {{ border: none; background: none; padding: 8px 14px; cursor: pointer; font-size: 15px; }}
  .tabs button.active {{ border-bottom: 2px solid #1e2430; font-weight: 600; margin-bottom: -2px; }}
  table {{ width: 100%; border-collapse: collapse; background: #fff; border-radius: 8px; overflow: hidden; }}
  th, td {{ text-align: left; padding: 8px 12px; border-bottom: 1px solid #edf0f4; font-size: 14px; }}
  .status {{ font-weight: 600; text-transform: uppercase; font-size: 12px; }}
  .status-passed {{ color: #2fa463; }}
  .status-failed {{ color: #d64545; }}
  .status-skipped {{ color: #d9a013; }}
  .status-unknown {{ color: #8b93a3; }}
  .muted {{ color: #77808f; }}
  .error-excerpt {{ font-family: monospace; font-size: 12px; color: #a33; background: #fbf0f0; padding: 6px 8px; border-radius: 4px; white-space: pre-wrap; }}
  .sev {{ font-size: 11px; padding: 2px 6px; border-radius: 4px; text-transform: uppercase; }}
  .sev-low {{ background: #eef2e6; color: #5a7031; }}
  .sev-medium {{ background: #fbf3dd; color: #8f6e14; }}
  .sev-high {{ background: #fbe5e5; color: #a33; }}
  .hidden {{ display: none; }}
  footer {{ padding: 16px 24px; font-size: 12px; color: #77808f; }}
</style>
</head>
<body>
<header>
  <div><strong>testdeck</strong> test report</div>
  <div class="muted">generated {generated_at} &middot; v{version}</div>
</header>
<main>
  <div class="cards">
    <div class="card"><div class="num">{total}</div>total</div>
    <div class="card"><div class="num status-passed">{passed}</div>passed</div>
    <div class="card"><div class="num status-failed">{failed}</div>failed</div>
    <div class="card"><div class="num status-skipped">{skipped}</div>skipped</div>
    <div class="card"><div class="num">{duration:.0} ms</div>duration</div>
  </div>
  <div class="bar">
    <div class="seg-passed" style="width:{w_passed:.4}%"></div>
    <div class="seg-failed" style="width:{w_failed:.4}%"></div>
    <div class="seg-skipped" style="width:{w_skipped:.4}%"></div>
    <div class="seg-unknown" style="width:{w_unknown:.4}%"></div>
  </div>
  <div class="tabs">
    <button class="active" data-tab="results">Results</button>
    <button data-tab="analytics">Analytics</button>
  </div>
  <section id="tab-results">
    <div class="controls">
      <button class="active" data-status="all">All</button>
      <button data-status="passed">Passed</button>
      <button data-status="failed">Failed</button>
      <button data-status="skipped">Skipped</button>
      <button data-status="unknown">Unknown</button>
      <input id="search" type="search" placeholder="Filter by name, description, or tag">
    </div>
    <table id="records">
      <thead><tr><th>Status</th><th>Test</th><th>File</th><th>Duration</th><th>Retries</th></tr></thead>
      <tbody>
{rows}      </tbody>
    </table>
  </section>
  <section id="tab-analytics" class="hidden">
    <h3>Flaky tests</h3>
    <ul>
{flaky_items}    </ul>
    <h3>Slowest tests</h3>
    <table>
      <thead><tr><th>Test</th><th>File</th><th>Duration</th><th>Longest step</th></tr></thead>
      <tbody>
{slow_rows}      </tbody>
    </table>
    <h3>Resource pressure</h3>
    <p>Memory (RSS): {rss} &middot; Load average: {load} &middot; Network: {network} &middot; Workers: {workers}</p>
    <p class="muted">{provenance}</p>
  </section>
</main>
<footer>Self-contained report; data embedded below, no server required.</footer>
<script type="application/json" id="testdeck-data">{embedded}</script>
<script>
(function () {{
  var data = JSON.parse(document.getElementById('testdeck-data').textContent);
  var statusFilter = 'all';
  var query = '';

  function matches(row) {{
    var status = row.getAttribute('data-status');
    if (statusFilter !== 'all' && status !== statusFilter) return false;
    if (!query) return true;
    return row.getAttribute('data-search').indexOf(query) !== -1;
  }}

  function refresh() {{
    var rows = document.querySelectorAll('#records tbody tr[data-status]');
    rows.forEach(function (row) {{
      row.classList.toggle('hidden', !matches(row));
      var detail = row.nextElementSibling;
      if (detail && !detail.hasAttribute('data-status')) {{
        detail.classList.toggle('hidden', !matches(row));
      }}
    }});
  }}

  document.querySelectorAll('.controls button').forEach(function (button) {{
    button.addEventListener('click', function () {{
      document.querySelectorAll('.controls button').forEach(function (b) {{ b.classList.remove('active'); }});
      button.classList.add('active');
      statusFilter = button.getAttribute('data-status');
      refresh();
    }});
  }});

  document.getElementById('search').addEventListener('input', function (event) {{
    query = event.target.value.toLowerCase();
    refresh();
  }});

  document.querySelectorAll('.tabs button').forEach(function (button) {{
    button.addEventListener('click', function () {{
      document.querySelectorAll('.tabs button').forEach(function (b) {{ b.classList.remove('active'); }});
      button.classList.add('active');
      var tab = button.getAttribute('data-tab');
      document.getElementById('tab-results').classList.toggle('hidden', tab !== 'results');
      document.getElementById('tab-analytics').classList.toggle('hidden', tab !== 'analytics');
    }});
  }});

  console.log('testdeck report: ' + data.records.length + ' record(s)');
}})();
</script>
</body>
</html>
"#,
        generated_at = escape_html(&data.generated_at),
        version = escape_html(&data.version),
        total = data.summary.total,
        passed = data.summary.passed,
        failed = data.summary.failed,
        skipped = data.summary.skipped,
        duration = data.summary.total_duration,
        w_passed = widths.passed,
        w_failed = widths.failed,
        w_skipped = widths.skipped,
        w_unknown = widths.unknown,
        rows = rows,
        flaky_items = flaky_items,
        slow_rows = slow_rows,
        rss = rss,
        load = load,
        network = network,
        workers = data.analytics.parallel_workers,
        provenance = escape_html(&data.analytics.provenance),
        embedded = embedded,
    );

    Ok(html)
}

/// Render one record as a table row (plus an error detail row when a
/// failure excerpt exists)
fn push_record_row(out: &mut String, record: &CanonicalTestRecord) {
    let search_blob = format!(
        "{} {} {}",
        record.test_name,
        record.description,
        record.tags.join(" ")
    )
    .to_lowercase();

    out.push_str(&format!(
        "<tr data-status=\"{status}\" data-search=\"{search}\">\
         <td><span class=\"status status-{status}\">{status}</span></td>\
         <td>{name}</td><td class=\"muted\">{file}</td>\
         <td>{duration:.0} ms</td><td>{retries}</td></tr>\n",
        status = record.status,
        search = escape_html(&search_blob),
        name = escape_html(&record.test_name),
        file = escape_html(&record.source_file),
        duration = record.duration,
        retries = record.retry_count,
    ));

    if let Some(error) = &record.error {
        out.push_str(&format!(
            "<tr><td colspan=\"5\"><div class=\"error-excerpt\">{}</div></td></tr>\n",
            escape_html(&truncate_excerpt(error)),
        ));
    }
}

fn truncate_excerpt(error: &str) -> String {
    if error.chars().count() <= ERROR_EXCERPT_LIMIT {
        return error.to_string();
    }
    let truncated: String = error.chars().take(ERROR_EXCERPT_LIMIT).collect();
    format!("{}…", truncated)
}

/// Assemble and write the report into the store.
///
/// Assembly failure still leaves a minimal fallback document in place, so
/// a report artifact always exists after a run.
pub fn write_report(
    store: &ResultStore,
    summary: &Summary,
    records: &[CanonicalTestRecord],
    analytics: &AnalyticsSnapshot,
) -> Result<PathBuf> {
    let data = ReportData {
        generated_at: Utc::now().to_rfc3339(),
        version: VERSION.to_string(),
        summary: summary.clone(),
        records: records.to_vec(),
        analytics: analytics.clone(),
    };

    let path = store.report_path();
    std::fs::create_dir_all(store.report_dir())?;

    match assemble_document(&data) {
        Ok(html) => {
            std::fs::write(&path, html)?;
            info!("report written to {}", path.display());
            Ok(path)
        }
        Err(e) => {
            error!("report assembly failed, writing fallback document: {}", e);
            let fallback = fallback_document(&e.to_string(), Utc::now());
            std::fs::write(&path, fallback)
                .map_err(|io| Error::Report(format!("failed to write fallback report: {}", io)))?;
            Ok(path)
        }
    }
}

/// Minimal document describing an assembly failure
pub fn fallback_document(reason: &str, at: DateTime<Utc>) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>testdeck report</title></head>\
         <body><h1>Report assembly failed</h1>\
         <p>{}</p><p>Generated {}</p></body></html>\n",
        escape_html(reason),
        at.to_rfc3339(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdeck_common::TestStatus;

    fn sample_data(records: Vec<CanonicalTestRecord>) -> ReportData {
        let summary = crate::analytics::summarize(&records);
        ReportData {
            generated_at: "2026-01-01T00:00:00+00:00".to_string(),
            version: VERSION.to_string(),
            summary,
            records,
            analytics: AnalyticsSnapshot::default(),
        }
    }

    fn record(name: &str, status: TestStatus) -> CanonicalTestRecord {
        let mut record = CanonicalTestRecord::new(name, "a.test.js");
        record.status = status;
        record
    }

    #[test]
    fn escaping_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<img src=x onerror="alert('1')">"#),
            "&lt;img src=x onerror=&quot;alert(&#39;1&#39;)&quot;&gt;"
        );
    }

    #[test]
    fn hostile_test_names_cannot_inject_markup() {
        let data = sample_data(vec![record(
            "<script>alert('pwned')</script>",
            TestStatus::Failed,
        )]);
        let html = assemble_document(&data).unwrap();
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;alert"));
    }

    #[test]
    fn embedded_data_cannot_close_the_script_block() {
        let mut rec = record("t", TestStatus::Failed);
        rec.error = Some("</script><script>alert(1)</script>".to_string());
        let data = sample_data(vec![rec]);
        let html = assemble_document(&data).unwrap();

        let embedded = extract_embedded(&html);
        assert!(!embedded.contains("</script>"));
    }

    #[test]
    fn embedded_data_round_trips() {
        let records = vec![
            record("t1", TestStatus::Passed),
            record("t2", TestStatus::Passed),
            record("t3", TestStatus::Failed),
        ];
        let data = sample_data(records);
        let html = assemble_document(&data).unwrap();

        let embedded = extract_embedded(&html).replace("<\\/", "</");
        let parsed: ReportData = serde_json::from_str(&embedded).unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.summary.passed, 2);
    }

    #[test]
    fn status_bar_sums_to_hundred() {
        let data = sample_data(vec![
            record("a", TestStatus::Passed),
            record("b", TestStatus::Failed),
            record("c", TestStatus::Unknown),
        ]);
        let widths = StatusBarWidths::from_summary(&data.summary);
        assert!((widths.sum() - 100.0).abs() < 1e-9);
        assert!(widths.unknown > 0.0);
    }

    #[test]
    fn zero_total_guards_division() {
        let widths = StatusBarWidths::from_summary(&Summary::default());
        assert_eq!(widths.sum(), 0.0);

        let data = sample_data(Vec::new());
        let html = assemble_document(&data).unwrap();
        assert!(html.contains("width:0.0000%"));
    }

    #[test]
    fn long_errors_are_truncated_inline() {
        let mut rec = record("t", TestStatus::Failed);
        rec.error = Some("x".repeat(1000));
        let data = sample_data(vec![rec]);
        let html = assemble_document(&data).unwrap();
        assert!(html.contains(&format!("{}…", "x".repeat(300))));
        assert!(!html.contains(&"x".repeat(301)));
    }

    #[test]
    fn fallback_document_escapes_reason() {
        let doc = fallback_document("<b>boom</b>", Utc::now());
        assert!(doc.contains("&lt;b&gt;boom&lt;/b&gt;"));
    }

    fn extract_embedded(html: &str) -> String {
        let start = html
            .find("<script type=\"application/json\" id=\"testdeck-data\">")
            .unwrap()
            + "<script type=\"application/json\" id=\"testdeck-data\">".len();
        let end = html[start..].find("</script>").unwrap() + start;
        html[start..end].to_string()
    }
}
