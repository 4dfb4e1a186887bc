// Run summaries and report rendering

use crate::data::{ClusteredFinding, ScanError, Severity};
use crate::scheduler::ScanOutcome;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const THIN_RULE: &str = "────────────────────────────────────────────────────────────────────────────────\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

/// Totals for one run. Counts come only from jobs that completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub pages_requested: usize,
    pub pages_scanned: usize,
    /// Pages with at least one failed job.
    pub pages_errored: usize,
    /// Scanned pages that produced no findings at any viewport.
    pub pages_clean: usize,
    pub jobs_total: usize,
    pub jobs_succeeded: usize,
    pub duration_ms: u64,
    pub total_findings: usize,
    pub total_clusters: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_viewport: BTreeMap<String, usize>,
    pub errors: Vec<ScanError>,
    pub artifacts: Vec<PathBuf>,
}

impl RunSummary {
    pub fn from_outcome(pages_requested: usize, outcome: &ScanOutcome, clusters: &[ClusteredFinding]) -> Self {
        let mut by_severity = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut by_viewport = BTreeMap::new();
        let mut pages_with_findings = HashSet::new();

        for finding in &outcome.findings {
            *by_severity.entry(finding.severity.as_str().to_string()).or_insert(0) += 1;
            *by_category.entry(finding.category.as_str().to_string()).or_insert(0) += 1;
            *by_viewport.entry(finding.viewport.clone()).or_insert(0) += 1;
            pages_with_findings.insert(finding.page_url.as_str());
        }

        let pages_errored = outcome
            .errors
            .iter()
            .map(|e| e.page_url.as_str())
            .collect::<HashSet<_>>()
            .len();

        Self {
            pages_requested,
            pages_scanned: outcome.pages_scanned,
            pages_errored,
            pages_clean: outcome.pages_scanned.saturating_sub(pages_with_findings.len()),
            jobs_total: outcome.jobs_total,
            jobs_succeeded: outcome.jobs_succeeded,
            duration_ms: outcome.duration.as_millis() as u64,
            total_findings: outcome.findings.len(),
            total_clusters: clusters.len(),
            by_severity,
            by_category,
            by_viewport,
            errors: outcome.errors.clone(),
            artifacts: outcome.artifacts.clone(),
        }
    }

    fn severity_count(&self, severity: Severity) -> usize {
        self.by_severity.get(severity.as_str()).copied().unwrap_or(0)
    }
}

/// Everything a report renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub mode: String,
    pub seeds: Vec<String>,
    pub summary: RunSummary,
    pub clusters: Vec<ClusteredFinding>,
    pub top: Vec<ClusteredFinding>,
}

/// 1 when any cluster is critical, 0 otherwise. Job errors do not count.
pub fn exit_code(clusters: &[ClusteredFinding]) -> i32 {
    if clusters.iter().any(|c| c.finding.severity == Severity::Critical) {
        1
    } else {
        0
    }
}

pub fn generate_text_report(report: &ScanReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    out.push_str(RULE);
    out.push_str("                             SITESIFT SCAN REPORT\n");
    out.push_str(RULE);
    out.push('\n');

    if let Some(ref run_id) = report.run_id {
        out.push_str(&format!("Run ID:       {}\n", run_id));
    }
    out.push_str(&format!("Mode:         {}\n", report.mode));
    out.push_str(&format!("Targets:      {}\n", format_targets(&report.seeds)));
    out.push_str(&format!(
        "Pages:        {} scanned of {} requested ({} errored, {} clean)\n",
        summary.pages_scanned, summary.pages_requested, summary.pages_errored, summary.pages_clean
    ));
    out.push_str(&format!("Jobs:         {}/{} succeeded\n", summary.jobs_succeeded, summary.jobs_total));
    out.push_str(&format!("Duration:     {:.1} seconds\n", summary.duration_ms as f64 / 1000.0));
    out.push('\n');

    out.push_str(RULE);
    out.push_str("SUMMARY\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "Total Findings: {} in {} clusters\n\n",
        summary.total_findings, summary.total_clusters
    ));

    for severity in Severity::ALL {
        let count = summary.severity_count(severity);
        if count > 0 {
            out.push_str(&format!(
                "  {:<11}{}\n",
                format!("[{}]", severity.as_str().to_uppercase()),
                count
            ));
        }
    }
    if !summary.by_viewport.is_empty() {
        out.push('\n');
        for (viewport, count) in &summary.by_viewport {
            out.push_str(&format!("  {:<11}{}\n", viewport, count));
        }
    }
    out.push('\n');

    if !report.top.is_empty() {
        out.push_str(RULE);
        out.push_str("TOP ISSUES\n");
        out.push_str(RULE);
        out.push('\n');
        for (idx, cluster) in report.top.iter().enumerate() {
            out.push_str(&format!(
                "  {}. [{}] {} ({}x)\n",
                idx + 1,
                cluster.finding.severity.as_str().to_uppercase(),
                cluster.finding.title,
                cluster.occurrence_count
            ));
        }
        out.push('\n');
    }

    if !report.clusters.is_empty() {
        out.push_str(RULE);
        out.push_str("DETAILED FINDINGS\n");
        out.push_str(RULE);
        out.push('\n');

        for (idx, cluster) in report.clusters.iter().enumerate() {
            let f = &cluster.finding;
            out.push_str(&format!("[{}] {}\n", idx + 1, f.title));
            out.push_str(&format!("Severity:     {}\n", f.severity.as_str().to_uppercase()));
            out.push_str(&format!("Confidence:   {}\n", f.confidence.as_str()));
            out.push_str(&format!("Category:     {}\n", f.category.as_str()));
            out.push_str(&format!("Rule:         {} ({})\n", f.rule_id, f.tool));
            out.push_str(&format!("Viewport:     {}\n", f.viewport));
            out.push_str(&format!(
                "Occurrences:  {} on {} page(s)\n",
                cluster.occurrence_count,
                cluster.affected_pages.len()
            ));
            out.push_str(&format!("Example:      {}\n", cluster.representative_url));
            if let Some(selector) = f.evidence.selectors.first() {
                out.push_str(&format!("Selector:     {}\n", selector));
            }
            if let Some(ref shot) = f.evidence.screenshot_path {
                out.push_str(&format!("Screenshot:   {}\n", shot.display()));
            }

            out.push_str("\nDescription:\n");
            out.push_str(&wrap_text(&f.description, 80, "  "));
            out.push('\n');

            if let Some(ref fix) = f.suggested_fix {
                out.push_str("Suggested fix:\n");
                out.push_str(&wrap_text(fix, 80, "  "));
                out.push('\n');
            }

            out.push_str(THIN_RULE);
            out.push('\n');
        }
    }

    if !summary.errors.is_empty() {
        out.push_str(RULE);
        out.push_str("ERRORS\n");
        out.push_str(RULE);
        out.push('\n');
        for error in &summary.errors {
            out.push_str(&format!("  {} @ {}\n", error.page_url, error.viewport));
            out.push_str(&wrap_text(&error.error, 80, "      "));
        }
        out.push('\n');
    }

    out.push_str(RULE);
    out.push_str("                                End of Report\n");
    out.push_str(RULE);
    out
}

pub fn generate_json_report(report: &ScanReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "sitesift",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "id": report.run_id,
                "mode": report.mode,
                "targets": report.seeds,
            },
            "summary": report.summary,
            "top": report.top,
            "clusters": report.clusters,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn render(report: &ScanReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Json => generate_json_report(report),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn format_targets(seeds: &[String]) -> String {
    match seeds {
        [] => "none".to_string(),
        [one] => one.clone(),
        many => format!("{} URLs", many.len()),
    }
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if !current_line.is_empty() && current_line.len() + word.len() + 1 > width - indent.len() {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
