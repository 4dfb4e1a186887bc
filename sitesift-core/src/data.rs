use crate::report::RunSummary;
use rusqlite::{Connection, Result, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// 0 for critical through 4 for info; lower sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Certain,
    Likely,
    NeedsReview,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Certain => "certain",
            Confidence::Likely => "likely",
            Confidence::NeedsReview => "needs_review",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Confidence::Certain => 0,
            Confidence::Likely => 1,
            Confidence::NeedsReview => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Accessibility,
    Usability,
    Design,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Accessibility => "accessibility",
            Category::Usability => "usability",
            Category::Design => "design",
            Category::Other => "other",
        }
    }
}

/// A named width/height preset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
        }
    }

    pub fn desktop() -> Self {
        Self::new("desktop", 1440, 900)
    }

    pub fn tablet() -> Self {
        Self::new("tablet", 768, 1024)
    }

    pub fn mobile() -> Self {
        Self::new("mobile", 375, 812)
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "desktop" => Some(Self::desktop()),
            "tablet" => Some(Self::tablet()),
            "mobile" => Some(Self::mobile()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub selectors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
}

/// One raw issue reported by an analyzer for one page at one viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    pub confidence: Confidence,
    pub page_url: String,
    pub viewport: String,
    pub title: String,
    pub description: String,
    pub evidence: Evidence,
    pub rule_id: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl Finding {
    /// A finding with a fresh id, empty evidence and `likely` confidence.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tool: &str,
        rule_id: &str,
        category: Category,
        severity: Severity,
        page_url: &str,
        viewport: &str,
        title: &str,
        description: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            severity,
            confidence: Confidence::Likely,
            page_url: page_url.to_string(),
            viewport: viewport.to_string(),
            title: title.to_string(),
            description,
            evidence: Evidence::default(),
            rule_id: rule_id.to_string(),
            tool: tool.to_string(),
            suggested_fix: None,
        }
    }
}

/// The representative finding of a cluster, plus where else it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub signature: String,
    pub affected_pages: Vec<String>,
    pub occurrence_count: usize,
    pub representative_url: String,
}

/// A job that could not complete. Never retried within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanError {
    pub page_url: String,
    pub viewport: String,
    pub error: String,
    pub timestamp: i64,
}

impl ScanError {
    pub fn new(page_url: &str, viewport: &str, error: String) -> Self {
        Self {
            page_url: page_url.to_string(),
            viewport: viewport.to_string(),
            error,
            timestamp: current_timestamp(),
        }
    }
}

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A row of the `scan_runs` table.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: String,
    pub mode: String,
    pub seed_urls: String,
    pub pages_scanned: Option<i64>,
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS scan_runs (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    mode TEXT NOT NULL CHECK(mode IN ('single', 'sitemap', 'bfs', 'journey')),
    seed_urls TEXT NOT NULL,      -- JSON array
    pages_requested INTEGER,
    pages_scanned INTEGER,
    pages_errored INTEGER,
    duration_ms INTEGER
);

CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    signature TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    tool TEXT NOT NULL,
    category TEXT NOT NULL,
    severity TEXT NOT NULL CHECK(severity IN ('critical', 'high', 'medium', 'low', 'info')),
    confidence TEXT NOT NULL CHECK(confidence IN ('certain', 'likely', 'needs_review')),
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    viewport TEXT NOT NULL,
    representative_url TEXT NOT NULL,
    affected_pages TEXT NOT NULL, -- JSON array
    occurrence_count INTEGER NOT NULL,
    selectors TEXT,               -- JSON array
    suggested_fix TEXT,

    FOREIGN KEY(run_id) REFERENCES scan_runs(id) ON DELETE CASCADE,
    UNIQUE(run_id, signature)
);

CREATE INDEX IF NOT EXISTS idx_clusters_run ON clusters(run_id);
CREATE INDEX IF NOT EXISTS idx_clusters_severity ON clusters(severity);

CREATE TABLE IF NOT EXISTS scan_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    page_url TEXT NOT NULL,
    viewport TEXT NOT NULL,
    error TEXT NOT NULL,
    timestamp INTEGER NOT NULL,

    FOREIGN KEY(run_id) REFERENCES scan_runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_scan_errors_run ON scan_errors(run_id);
            ",
        )?;
        Ok(())
    }

    // Run management
    pub fn create_run(&self, mode: &str, seed_urls: &[String]) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let seeds = serde_json::to_string(seed_urls).unwrap_or_else(|_| "[]".to_string());

        self.conn.execute(
            "INSERT INTO scan_runs (id, start_time, status, mode, seed_urls) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&run_id, current_timestamp(), "running", mode, seeds],
        )?;

        Ok(run_id)
    }

    pub fn complete_run(&self, run_id: &str, summary: &RunSummary) -> Result<()> {
        self.conn.execute(
            "UPDATE scan_runs SET status = ?1, end_time = ?2, pages_requested = ?3,
                pages_scanned = ?4, pages_errored = ?5, duration_ms = ?6
             WHERE id = ?7",
            params![
                "completed",
                current_timestamp(),
                summary.pages_requested as i64,
                summary.pages_scanned as i64,
                summary.pages_errored as i64,
                summary.duration_ms as i64,
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn fail_run(&self, run_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE scan_runs SET status = ?1, end_time = ?2 WHERE id = ?3",
            params!["failed", current_timestamp(), run_id],
        )?;
        Ok(())
    }

    pub fn insert_cluster(&self, run_id: &str, cluster: &ClusteredFinding) -> Result<i64> {
        insert_cluster(&self.conn, run_id, cluster)
    }

    pub fn insert_scan_error(&self, run_id: &str, error: &ScanError) -> Result<i64> {
        insert_scan_error(&self.conn, run_id, error)
    }

    /// Persist a whole finished run in one transaction.
    pub fn record_run(
        &mut self,
        run_id: &str,
        clusters: &[ClusteredFinding],
        summary: &RunSummary,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        for cluster in clusters {
            insert_cluster(&tx, run_id, cluster)?;
        }
        for error in &summary.errors {
            insert_scan_error(&tx, run_id, error)?;
        }
        tx.commit()?;
        self.complete_run(run_id, summary)
    }

    /// (signature, severity, title, occurrence_count), worst first.
    pub fn get_clusters_by_run(&self, run_id: &str) -> Result<Vec<(String, String, String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT signature, severity, title, occurrence_count FROM clusters WHERE run_id = ?1
             ORDER BY CASE severity
                WHEN 'critical' THEN 1
                WHEN 'high' THEN 2
                WHEN 'medium' THEN 3
                WHEN 'low' THEN 4
                WHEN 'info' THEN 5
             END, occurrence_count DESC, id",
        )?;

        let clusters = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(clusters)
    }

    pub fn get_cluster_count_by_severity(&self, run_id: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT severity, COUNT(*) FROM clusters WHERE run_id = ?1 GROUP BY severity",
        )?;

        let counts = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;

        Ok(counts)
    }

    pub fn get_errors_by_run(&self, run_id: &str) -> Result<Vec<ScanError>> {
        let mut stmt = self.conn.prepare(
            "SELECT page_url, viewport, error, timestamp FROM scan_errors WHERE run_id = ?1 ORDER BY id",
        )?;

        let errors = stmt
            .query_map(params![run_id], |row| {
                Ok(ScanError {
                    page_url: row.get(0)?,
                    viewport: row.get(1)?,
                    error: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(errors)
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, status, mode, seed_urls, pages_scanned
             FROM scan_runs ORDER BY start_time DESC, rowid DESC",
        )?;

        let runs = stmt
            .query_map([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    start_time: row.get(1)?,
                    end_time: row.get(2)?,
                    status: row.get(3)?,
                    mode: row.get(4)?,
                    seed_urls: row.get(5)?,
                    pages_scanned: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(runs)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

fn insert_cluster(conn: &Connection, run_id: &str, cluster: &ClusteredFinding) -> Result<i64> {
    let f = &cluster.finding;
    let pages = serde_json::to_string(&cluster.affected_pages).unwrap_or_else(|_| "[]".to_string());
    let selectors = serde_json::to_string(&f.evidence.selectors).ok();

    conn.execute(
        "INSERT INTO clusters (
            run_id, signature, rule_id, tool, category, severity, confidence,
            title, description, viewport, representative_url, affected_pages,
            occurrence_count, selectors, suggested_fix
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            run_id,
            &cluster.signature,
            &f.rule_id,
            &f.tool,
            f.category.as_str(),
            f.severity.as_str(),
            f.confidence.as_str(),
            &f.title,
            &f.description,
            &f.viewport,
            &cluster.representative_url,
            pages,
            cluster.occurrence_count as i64,
            selectors,
            &f.suggested_fix,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn insert_scan_error(conn: &Connection, run_id: &str, error: &ScanError) -> Result<i64> {
    conn.execute(
        "INSERT INTO scan_errors (run_id, page_url, viewport, error, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![run_id, &error.page_url, &error.viewport, &error.error, error.timestamp],
    )?;
    Ok(conn.last_insert_rowid())
}
