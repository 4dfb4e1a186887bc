// Batched scan scheduler. Every job gets its own browsing context, which is
// closed on every exit path; at most `concurrency` contexts are open at once.

use crate::analyzer::Analyzer;
use crate::browser::{Browser, BrowserContext, BrowserResult, ContextOptions, Page, WaitUntil};
use crate::config::{AuthConfig, DEFAULT_CONCURRENCY, TimeoutConfig};
use crate::data::{Finding, ScanError, Severity};
use crate::error::{BrowserError, JobError};
use crate::jobs::ScanJob;
use crate::steps::{Step, run_steps};
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// Called after each job settles with (completed, total, job).
pub type JobProgressCallback = Arc<dyn Fn(usize, usize, &ScanJob) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub concurrency: usize,
    pub timeouts: TimeoutConfig,
    pub locale: String,
    pub auth: Option<AuthConfig>,
    pub journey: Vec<Step>,
    /// Screenshots are written under `<dir>/screenshots/`; none are taken without it.
    pub artifacts_dir: Option<PathBuf>,
    pub max_element_screenshots: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeouts: TimeoutConfig::default(),
            locale: "en-US".to_string(),
            auth: None,
            journey: Vec::new(),
            artifacts_dir: None,
            max_element_screenshots: 10,
        }
    }
}

/// What one successful job produced.
#[derive(Debug)]
struct JobReport {
    findings: Vec<Finding>,
    artifacts: Vec<PathBuf>,
    elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub findings: Vec<Finding>,
    pub errors: Vec<ScanError>,
    pub jobs_total: usize,
    pub jobs_succeeded: usize,
    /// Distinct URLs with at least one successful job.
    pub pages_scanned: usize,
    pub severity_counts: BTreeMap<Severity, usize>,
    /// Wall-clock time of the whole run.
    pub duration: Duration,
    /// Summed time of the successful jobs.
    pub scan_time: Duration,
    pub artifacts: Vec<PathBuf>,
}

impl ScanOutcome {
    fn record_success(&mut self, report: JobReport) {
        self.jobs_succeeded += 1;
        self.scan_time += report.elapsed;
        for finding in &report.findings {
            *self.severity_counts.entry(finding.severity).or_insert(0) += 1;
        }
        self.findings.extend(report.findings);
        self.artifacts.extend(report.artifacts);
    }
}

pub struct Scheduler {
    browser: Arc<dyn Browser>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    options: SchedulerOptions,
    progress_callback: Option<JobProgressCallback>,
}

impl Scheduler {
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self {
            browser,
            analyzers: Vec::new(),
            options: SchedulerOptions::default(),
            progress_callback: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress_callback(mut self, callback: JobProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Runs every job. Never fails: a failing job becomes a `ScanError`.
    pub async fn run(&self, jobs: &[ScanJob]) -> ScanOutcome {
        let started = Instant::now();
        let concurrency = self.options.concurrency.max(1);
        let total = jobs.len();

        let mut outcome = ScanOutcome {
            jobs_total: total,
            ..ScanOutcome::default()
        };
        let mut scanned_urls = HashSet::new();
        let mut completed = 0;

        info!(
            "Scanning {} jobs with {} analyzers, {} at a time",
            total,
            self.analyzers.len(),
            concurrency
        );

        for (batch_no, batch) in jobs.chunks(concurrency).enumerate() {
            debug!("Starting batch {} ({} jobs)", batch_no + 1, batch.len());

            // The next batch only starts once all of these have settled.
            let results = join_all(batch.iter().map(|job| self.run_job(job))).await;

            for (job, result) in batch.iter().zip(results) {
                completed += 1;
                match result {
                    Ok(report) => {
                        debug!("{}: {} findings", job, report.findings.len());
                        scanned_urls.insert(job.url.clone());
                        outcome.record_success(report);
                    }
                    Err(e) => {
                        warn!("Job {} failed: {}", job, e);
                        outcome
                            .errors
                            .push(ScanError::new(&job.url, &job.viewport.name, e.to_string()));
                    }
                }
                if let Some(ref callback) = self.progress_callback {
                    callback(completed, total, job);
                }
            }
        }

        outcome.pages_scanned = scanned_urls.len();
        outcome.duration = started.elapsed();
        info!(
            "Scan finished: {}/{} jobs succeeded, {} findings",
            outcome.jobs_succeeded,
            total,
            outcome.findings.len()
        );
        outcome
    }

    fn context_options(&self, job: &ScanJob) -> ContextOptions {
        let mut options = ContextOptions::new(job.viewport.clone());
        options.locale = self.options.locale.clone();
        match &self.options.auth {
            Some(AuthConfig::Cookies { cookies }) => options.cookies = cookies.clone(),
            Some(AuthConfig::Headers { headers }) => options.extra_headers = headers.clone(),
            Some(AuthConfig::Login { .. }) | None => {}
        }
        options
    }

    async fn run_job(&self, job: &ScanJob) -> Result<JobReport, JobError> {
        let context = self
            .browser
            .new_context(self.context_options(job))
            .await
            .map_err(JobError::Context)?;

        let budget = self.options.timeouts.job();
        let guarded = AssertUnwindSafe(timeout(budget, self.scan_in_context(context.as_ref(), job)))
            .catch_unwind()
            .await;

        let result = match guarded {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(JobError::Timeout(budget)),
            Err(panic) => Err(JobError::Panicked(panic_message(panic))),
        };

        if let Err(e) = context.close().await {
            warn!("Failed to close context for {}: {}", job, e);
        }

        result
    }

    async fn scan_in_context(&self, context: &dyn BrowserContext, job: &ScanJob) -> Result<JobReport, JobError> {
        let started = Instant::now();
        let timeouts = &self.options.timeouts;
        let owned_page = context.new_page().await.map_err(JobError::Context)?;
        let page = owned_page.as_ref();

        if let Some(AuthConfig::Login { steps }) = &self.options.auth {
            run_steps(page, steps, timeouts.operation())
                .await
                .map_err(JobError::Auth)?;
        }

        page.goto(&job.url, WaitUntil::Load, timeouts.navigation())
            .await
            .map_err(JobError::Navigation)?;

        let stable = wait_for_stable(page, timeouts.stability_interval(), timeouts.stability_timeout())
            .await
            .map_err(JobError::Navigation)?;
        if !stable {
            debug!("{}: DOM still changing after {:?}", job, timeouts.stability_timeout());
        }

        if !self.options.journey.is_empty() {
            run_steps(page, &self.options.journey, timeouts.operation())
                .await
                .map_err(JobError::Interaction)?;
        }

        let mut artifacts = Vec::new();
        if let Some(path) = self.page_screenshot(page, job).await {
            artifacts.push(path);
        }

        let results = join_all(self.analyzers.iter().map(|analyzer| {
            bounded(timeouts.operation(), analyzer.analyze(page, &job.url, &job.viewport))
        }))
        .await;

        let mut findings = Vec::new();
        for (analyzer, result) in self.analyzers.iter().zip(results) {
            match result {
                Ok(found) => findings.extend(found),
                Err(source) => {
                    return Err(JobError::Analyzer {
                        name: analyzer.name().to_string(),
                        source,
                    });
                }
            }
        }

        artifacts.extend(self.element_screenshots(page, job, &mut findings).await);

        Ok(JobReport {
            findings,
            artifacts,
            elapsed: started.elapsed(),
        })
    }

    fn screenshot_dir(&self) -> Option<PathBuf> {
        self.options.artifacts_dir.as_ref().map(|dir| dir.join("screenshots"))
    }

    async fn page_screenshot(&self, page: &dyn Page, job: &ScanJob) -> Option<PathBuf> {
        let path = self.screenshot_dir()?.join(format!("{}.png", job.slug()));
        match bounded(self.options.timeouts.operation(), page.screenshot(&path, true)).await {
            Ok(()) => Some(path),
            Err(e) => {
                debug!("{}: no page screenshot: {}", job, e);
                None
            }
        }
    }

    /// Best effort: a failed capture leaves the finding without a screenshot.
    async fn element_screenshots(&self, page: &dyn Page, job: &ScanJob, findings: &mut [Finding]) -> Vec<PathBuf> {
        let Some(dir) = self.screenshot_dir() else {
            return Vec::new();
        };

        let mut order: Vec<usize> = (0..findings.len()).collect();
        order.sort_by_key(|&i| findings[i].severity.rank());

        let mut captured = Vec::new();
        for (n, idx) in order
            .into_iter()
            .take(self.options.max_element_screenshots)
            .enumerate()
        {
            let finding = &mut findings[idx];
            let Some(selector) = finding.evidence.selectors.first().cloned() else {
                continue;
            };
            let path = dir.join(format!("{}-{}-{}.png", job.slug(), finding.rule_id, n + 1));
            let capture = page.element_screenshot(&selector, &path);
            match bounded(self.options.timeouts.operation(), capture).await {
                Ok(()) => {
                    finding.evidence.screenshot_path = Some(path.clone());
                    captured.push(path);
                }
                Err(e) => debug!("{}: element screenshot for {} skipped: {}", job, selector, e),
            }
        }
        captured
    }
}

/// Runs one browser operation, turning an overrun into `BrowserError::Timeout`.
async fn bounded<T, F>(limit: Duration, operation: F) -> BrowserResult<T>
where
    F: Future<Output = BrowserResult<T>>,
{
    timeout(limit, operation)
        .await
        .unwrap_or(Err(BrowserError::Timeout(limit)))
}

/// Polls the page content until two consecutive reads `interval` apart match.
/// Returns `false` when `ceiling` passes first.
pub async fn wait_for_stable(page: &dyn Page, interval: Duration, ceiling: Duration) -> BrowserResult<bool> {
    let deadline = Instant::now() + ceiling;
    let mut previous = page.content().await?;

    loop {
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(interval).await;
        let current = page.content().await?;
        if current == previous {
            return Ok(true);
        }
        previous = current;
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
