use async_trait::async_trait;
use sitesift_core::analyzer::{Analyzer, MarkupAnalyzer};
use sitesift_core::browser::{
    BoundingBox, Browser, BrowserContext, BrowserResult, ContextOptions, Cookie, Page, WaitUntil,
};
use sitesift_core::config::{AuthConfig, TimeoutConfig};
use sitesift_core::data::{Category, Finding, Severity, Viewport};
use sitesift_core::error::BrowserError;
use sitesift_core::jobs::{ScanJob, build_job_matrix};
use sitesift_core::scheduler::{Scheduler, SchedulerOptions, wait_for_stable};
use sitesift_core::steps::Step;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const CLEAN_PAGE: &str = r#"<html lang="en"><head><title>Ok</title></head><body><p>fine</p></body></html>"#;
const BROKEN_PAGE: &str = r#"<html lang="en"><head><title>Shop</title></head><body><img src="a.png"></body></html>"#;

#[derive(Clone)]
enum Behavior {
    Serve(&'static str),
    Fail,
    Hang,
    Panic,
    Slow(u64, &'static str),
}

#[derive(Default)]
struct Tracker {
    open: AtomicUsize,
    max_open: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    options: Mutex<Vec<ContextOptions>>,
    navigations: Mutex<Vec<String>>,
    clicks: Mutex<Vec<String>>,
    shots: Mutex<Vec<String>>,
}

struct FakeBrowser {
    pages: HashMap<String, Behavior>,
    tracker: Arc<Tracker>,
}

impl FakeBrowser {
    fn new(pages: &[(&str, Behavior)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, behavior)| (url.to_string(), behavior.clone()))
                .collect(),
            tracker: Arc::new(Tracker::default()),
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_context(&self, options: ContextOptions) -> BrowserResult<Box<dyn BrowserContext>> {
        let now_open = self.tracker.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.max_open.fetch_max(now_open, Ordering::SeqCst);
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        self.tracker.options.lock().unwrap().push(options);
        Ok(Box::new(FakeContext {
            pages: self.pages.clone(),
            tracker: Arc::clone(&self.tracker),
        }))
    }
}

struct FakeContext {
    pages: HashMap<String, Behavior>,
    tracker: Arc<Tracker>,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> BrowserResult<Box<dyn Page>> {
        Ok(Box::new(FakePage::new(self.pages.clone(), Arc::clone(&self.tracker), None)))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.tracker.open.fetch_sub(1, Ordering::SeqCst);
        self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    pages: HashMap<String, Behavior>,
    tracker: Arc<Tracker>,
    body: Mutex<Option<&'static str>>,
    /// When set, every content read returns something new.
    changing: bool,
    reads: AtomicUsize,
}

impl FakePage {
    fn new(pages: HashMap<String, Behavior>, tracker: Arc<Tracker>, body: Option<&'static str>) -> Self {
        Self {
            pages,
            tracker,
            body: Mutex::new(body),
            changing: false,
            reads: AtomicUsize::new(0),
        }
    }

    fn detached(body: Option<&'static str>) -> Self {
        Self::new(HashMap::new(), Arc::new(Tracker::default()), body)
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _wait_until: WaitUntil, _timeout: Duration) -> BrowserResult<()> {
        self.tracker.navigations.lock().unwrap().push(url.to_string());
        match self.pages.get(url).cloned() {
            Some(Behavior::Serve(html)) => {
                *self.body.lock().unwrap() = Some(html);
                Ok(())
            }
            Some(Behavior::Slow(ms, html)) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                *self.body.lock().unwrap() = Some(html);
                Ok(())
            }
            Some(Behavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            Some(Behavior::Panic) => panic!("renderer crashed"),
            Some(Behavior::Fail) | None => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            }),
        }
    }

    async fn content(&self) -> BrowserResult<String> {
        if self.changing {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            return Ok(format!("<p>{}</p>", n));
        }
        self.body
            .lock()
            .unwrap()
            .map(str::to_string)
            .ok_or(BrowserError::NoContent)
    }

    async fn evaluate(&self, _script: &str, _args: serde_json::Value) -> BrowserResult<serde_json::Value> {
        Err(BrowserError::Unsupported("evaluate"))
    }

    async fn screenshot(&self, _path: &Path, _full_page: bool) -> BrowserResult<()> {
        Err(BrowserError::Unsupported("screenshot"))
    }

    async fn element_screenshot(&self, selector: &str, _path: &Path) -> BrowserResult<()> {
        self.tracker.shots.lock().unwrap().push(selector.to_string());
        if selector.contains(".odd") {
            return Err(BrowserError::Screenshot("element is detached".to_string()));
        }
        Ok(())
    }

    async fn bounding_box(&self, _selector: &str) -> BrowserResult<Option<BoundingBox>> {
        Ok(None)
    }

    async fn fill(&self, _selector: &str, _text: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        if !selector.starts_with("#ok") {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        self.tracker.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn press(&self, _key: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> BrowserResult<()> {
        if selector == "#never" {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }
}

/// Always fails, to exercise analyzer error handling.
struct BrokenAnalyzer;

#[async_trait]
impl Analyzer for BrokenAnalyzer {
    fn name(&self) -> &str {
        "broken"
    }

    async fn analyze(&self, _page: &dyn Page, _page_url: &str, _viewport: &Viewport) -> Result<Vec<Finding>, BrowserError> {
        Err(BrowserError::Script("boom".to_string()))
    }
}

/// Reports one low finding per page.
struct NoteAnalyzer;

#[async_trait]
impl Analyzer for NoteAnalyzer {
    fn name(&self) -> &str {
        "note"
    }

    async fn analyze(&self, _page: &dyn Page, page_url: &str, viewport: &Viewport) -> Result<Vec<Finding>, BrowserError> {
        Ok(vec![Finding::new(
            "note",
            "note-rule",
            Category::Design,
            Severity::Low,
            page_url,
            &viewport.name,
            "Note",
            "A note".to_string(),
        )])
    }
}

/// Twelve findings: ten low ones first, then two critical ones.
struct CrowdedAnalyzer;

#[async_trait]
impl Analyzer for CrowdedAnalyzer {
    fn name(&self) -> &str {
        "crowded"
    }

    async fn analyze(&self, _page: &dyn Page, page_url: &str, viewport: &Viewport) -> Result<Vec<Finding>, BrowserError> {
        let mut selectors: Vec<(Severity, String)> = (0..10).map(|i| (Severity::Low, format!(".low-{}", i))).collect();
        selectors.push((Severity::Critical, ".crit-a".to_string()));
        selectors.push((Severity::Critical, ".odd-crit-b".to_string()));

        Ok(selectors
            .into_iter()
            .map(|(severity, selector)| {
                let mut f = Finding::new(
                    "crowded",
                    "crowded-rule",
                    Category::Design,
                    severity,
                    page_url,
                    &viewport.name,
                    "Crowded",
                    "Too much going on".to_string(),
                );
                f.evidence.selectors = vec![selector];
                f
            })
            .collect())
    }
}

/// Never finishes.
struct SleepyAnalyzer;

#[async_trait]
impl Analyzer for SleepyAnalyzer {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn analyze(&self, _page: &dyn Page, _page_url: &str, _viewport: &Viewport) -> Result<Vec<Finding>, BrowserError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        navigation_ms: 1_000,
        operation_ms: 1_000,
        stability_interval_ms: 1,
        stability_timeout_ms: 20,
        job_ms: 300,
    }
}

fn options(concurrency: usize) -> SchedulerOptions {
    SchedulerOptions {
        concurrency,
        timeouts: fast_timeouts(),
        ..SchedulerOptions::default()
    }
}

fn jobs(urls: &[&str], viewports: &[Viewport]) -> Vec<ScanJob> {
    let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
    build_job_matrix(&urls, viewports)
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let urls = ["https://a.test/1", "https://a.test/2", "https://a.test/3", "https://a.test/4", "https://a.test/5"];
    let pages: Vec<(&str, Behavior)> = urls.iter().map(|u| (*u, Behavior::Slow(20, CLEAN_PAGE))).collect();
    let browser = Arc::new(FakeBrowser::new(&pages));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser)
        .with_analyzer(Arc::new(MarkupAnalyzer::new()))
        .with_options(options(2));
    let outcome = scheduler.run(&jobs(&urls, &[Viewport::desktop()])).await;

    assert_eq!(outcome.jobs_total, 5);
    assert_eq!(outcome.jobs_succeeded, 5);
    assert!(outcome.errors.is_empty());
    assert!(tracker.max_open.load(Ordering::SeqCst) <= 2);
    assert_eq!(tracker.opened.load(Ordering::SeqCst), 5);
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 5);
    assert_eq!(tracker.open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_navigation_error_does_not_abort_siblings() {
    let browser = Arc::new(FakeBrowser::new(&[
        ("https://a.test/ok", Behavior::Serve(BROKEN_PAGE)),
        ("https://a.test/down", Behavior::Fail),
        ("https://a.test/also-ok", Behavior::Serve(CLEAN_PAGE)),
    ]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser)
        .with_analyzer(Arc::new(MarkupAnalyzer::new()))
        .with_options(options(3));
    let outcome = scheduler
        .run(&jobs(
            &["https://a.test/ok", "https://a.test/down", "https://a.test/also-ok"],
            &[Viewport::desktop()],
        ))
        .await;

    assert_eq!(outcome.jobs_succeeded, 2);
    assert_eq!(outcome.pages_scanned, 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].page_url, "https://a.test/down");
    assert_eq!(outcome.errors[0].viewport, "desktop");
    assert!(outcome.errors[0].error.contains("ERR_CONNECTION_REFUSED"));

    assert!(outcome.findings.iter().any(|f| f.rule_id == "image-alt"));
    assert_eq!(outcome.severity_counts.get(&Severity::Critical), Some(&1));
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_batch_barrier_waits_for_slow_and_failing_jobs() {
    let browser = Arc::new(FakeBrowser::new(&[
        ("https://a.test/slow", Behavior::Slow(80, CLEAN_PAGE)),
        ("https://a.test/fail", Behavior::Fail),
        ("https://a.test/next", Behavior::Serve(CLEAN_PAGE)),
    ]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser).with_options(options(2));
    let outcome = scheduler
        .run(&jobs(
            &["https://a.test/slow", "https://a.test/fail", "https://a.test/next"],
            &[Viewport::desktop()],
        ))
        .await;

    assert_eq!(outcome.jobs_succeeded, 2);
    assert_eq!(outcome.errors.len(), 1);
    // The third job only starts after the first batch has fully settled.
    let navigations = tracker.navigations.lock().unwrap().clone();
    assert_eq!(navigations.last().map(String::as_str), Some("https://a.test/next"));
}

#[tokio::test]
async fn test_job_timeout_becomes_error_and_closes_context() {
    let browser = Arc::new(FakeBrowser::new(&[
        ("https://a.test/hang", Behavior::Hang),
        ("https://a.test/fine", Behavior::Serve(CLEAN_PAGE)),
    ]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser).with_options(options(2));
    let outcome = scheduler
        .run(&jobs(&["https://a.test/hang", "https://a.test/fine"], &[Viewport::desktop()]))
        .await;

    assert_eq!(outcome.jobs_succeeded, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].page_url, "https://a.test/hang");
    assert!(outcome.errors[0].error.contains("exceeded its 300ms budget"));
    assert_eq!(tracker.open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_panicking_job_is_isolated() {
    let browser = Arc::new(FakeBrowser::new(&[
        ("https://a.test/crash", Behavior::Panic),
        ("https://a.test/fine", Behavior::Serve(CLEAN_PAGE)),
    ]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser).with_options(options(2));
    let outcome = scheduler
        .run(&jobs(&["https://a.test/crash", "https://a.test/fine"], &[Viewport::desktop()]))
        .await;

    assert_eq!(outcome.jobs_succeeded, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].error.contains("renderer crashed"));
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_analyzer_error_fails_only_that_job() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));

    let scheduler = Scheduler::new(browser)
        .with_analyzer(Arc::new(NoteAnalyzer))
        .with_analyzer(Arc::new(BrokenAnalyzer))
        .with_options(options(1));
    let outcome = scheduler.run(&jobs(&["https://a.test/"], &[Viewport::desktop()])).await;

    assert_eq!(outcome.jobs_succeeded, 0);
    assert!(outcome.findings.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].error.contains("broken"));
}

#[tokio::test]
async fn test_every_viewport_gets_its_own_context() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser)
        .with_analyzer(Arc::new(NoteAnalyzer))
        .with_options(options(3));
    let outcome = scheduler
        .run(&jobs(&["https://a.test/"], &[Viewport::desktop(), Viewport::mobile()]))
        .await;

    assert_eq!(outcome.jobs_succeeded, 2);
    assert_eq!(outcome.pages_scanned, 1);
    let viewports: Vec<String> = outcome.findings.iter().map(|f| f.viewport.clone()).collect();
    assert_eq!(viewports, vec!["desktop", "mobile"]);

    let options = tracker.options.lock().unwrap();
    let widths: Vec<u32> = options.iter().map(|o| o.viewport.width).collect();
    assert_eq!(widths.len(), 2);
    assert!(widths.contains(&1440));
    assert!(widths.contains(&375));
}

#[tokio::test]
async fn test_cookie_auth_is_applied_to_every_context() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));
    let tracker = Arc::clone(&browser.tracker);

    let cookie = Cookie {
        name: "session".to_string(),
        value: "abc123".to_string(),
        domain: "a.test".to_string(),
        path: "/".to_string(),
    };
    let scheduler = Scheduler::new(browser).with_options(SchedulerOptions {
        auth: Some(AuthConfig::Cookies {
            cookies: vec![cookie.clone()],
        }),
        locale: "fr-FR".to_string(),
        ..options(2)
    });
    scheduler
        .run(&jobs(&["https://a.test/"], &[Viewport::desktop(), Viewport::tablet()]))
        .await;

    let options = tracker.options.lock().unwrap();
    assert_eq!(options.len(), 2);
    for opts in options.iter() {
        assert_eq!(opts.cookies, vec![cookie.clone()]);
        assert_eq!(opts.locale, "fr-FR");
        assert!(opts.extra_headers.is_empty());
    }
}

#[tokio::test]
async fn test_header_auth_is_applied() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));
    let tracker = Arc::clone(&browser.tracker);

    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), "Bearer token".to_string());
    let scheduler = Scheduler::new(browser).with_options(SchedulerOptions {
        auth: Some(AuthConfig::Headers { headers: headers.clone() }),
        ..options(1)
    });
    scheduler.run(&jobs(&["https://a.test/"], &[Viewport::desktop()])).await;

    let options = tracker.options.lock().unwrap();
    assert_eq!(options[0].extra_headers, headers);
    assert!(options[0].cookies.is_empty());
}

#[tokio::test]
async fn test_failed_login_is_an_auth_error() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));

    let scheduler = Scheduler::new(browser).with_options(SchedulerOptions {
        auth: Some(AuthConfig::Login {
            steps: vec![Step::Click {
                selector: "#sign-in".to_string(),
            }],
        }),
        ..options(1)
    });
    let outcome = scheduler.run(&jobs(&["https://a.test/"], &[Viewport::desktop()])).await;

    assert_eq!(outcome.jobs_succeeded, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].error.contains("#sign-in"));
}

#[tokio::test]
async fn test_progress_callback_counts_every_job() {
    let browser = Arc::new(FakeBrowser::new(&[
        ("https://a.test/1", Behavior::Serve(CLEAN_PAGE)),
        ("https://a.test/2", Behavior::Fail),
        ("https://a.test/3", Behavior::Serve(CLEAN_PAGE)),
    ]));

    let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let scheduler = Scheduler::new(browser)
        .with_options(options(2))
        .with_progress_callback(Arc::new(move |done: usize, total: usize, _job: &ScanJob| {
            seen_clone.lock().unwrap().push((done, total));
        }));
    scheduler
        .run(&jobs(
            &["https://a.test/1", "https://a.test/2", "https://a.test/3"],
            &[Viewport::desktop()],
        ))
        .await;

    assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn test_empty_job_list() {
    let browser = Arc::new(FakeBrowser::new(&[]));
    let outcome = Scheduler::new(browser).with_options(options(2)).run(&[]).await;

    assert_eq!(outcome.jobs_total, 0);
    assert_eq!(outcome.jobs_succeeded, 0);
    assert!(outcome.findings.is_empty());
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn test_wait_for_stable_on_static_page() {
    let page = FakePage::detached(Some(CLEAN_PAGE));
    let stable = wait_for_stable(&page, Duration::from_millis(1), Duration::from_millis(50))
        .await
        .unwrap();
    assert!(stable);
}

#[tokio::test]
async fn test_wait_for_stable_propagates_missing_content() {
    let page = FakePage::detached(None);
    let result = wait_for_stable(&page, Duration::from_millis(1), Duration::from_millis(50)).await;
    assert!(matches!(result, Err(BrowserError::NoContent)));
}

#[tokio::test]
async fn test_wait_for_stable_gives_up_on_changing_content() {
    let mut page = FakePage::detached(None);
    page.changing = true;

    let stable = wait_for_stable(&page, Duration::from_millis(1), Duration::from_millis(30))
        .await
        .unwrap();
    assert!(!stable);
    assert!(page.reads.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_element_screenshots_go_to_most_severe_findings() {
    let dir = TempDir::new().unwrap();
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser)
        .with_analyzer(Arc::new(CrowdedAnalyzer))
        .with_options(SchedulerOptions {
            artifacts_dir: Some(dir.path().to_path_buf()),
            ..options(1)
        });
    let outcome = scheduler.run(&jobs(&["https://a.test/"], &[Viewport::desktop()])).await;

    assert_eq!(outcome.jobs_succeeded, 1);
    // A failed capture keeps its finding.
    assert_eq!(outcome.findings.len(), 12);

    let shots = tracker.shots.lock().unwrap().clone();
    assert_eq!(shots.len(), 10);
    assert!(shots.contains(&".crit-a".to_string()));
    assert!(shots.contains(&".odd-crit-b".to_string()));
    assert!(!shots.contains(&".low-9".to_string()));

    let path_of = |selector: &str| {
        outcome
            .findings
            .iter()
            .find(|f| f.evidence.selectors[0] == selector)
            .and_then(|f| f.evidence.screenshot_path.clone())
    };
    let critical = path_of(".crit-a").unwrap();
    assert!(critical.starts_with(dir.path().join("screenshots")));
    assert!(path_of(".odd-crit-b").is_none());
    assert!(path_of(".low-9").is_none());

    let with_screenshot = outcome
        .findings
        .iter()
        .filter(|f| f.evidence.screenshot_path.is_some())
        .count();
    assert_eq!(with_screenshot, 9);
    assert_eq!(outcome.artifacts.len(), 9);
}

#[tokio::test]
async fn test_journey_runs_after_navigation() {
    let browser = Arc::new(FakeBrowser::new(&[
        ("https://a.test/cart", Behavior::Serve(BROKEN_PAGE)),
        ("https://a.test/checkout", Behavior::Serve(CLEAN_PAGE)),
    ]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser)
        .with_analyzer(Arc::new(MarkupAnalyzer::new()))
        .with_options(SchedulerOptions {
            journey: vec![
                Step::Click {
                    selector: "#ok-accept-cookies".to_string(),
                },
                Step::Navigate {
                    url: "https://a.test/checkout".to_string(),
                },
                Step::WaitForSelector {
                    selector: "main".to_string(),
                    timeout_ms: Some(10),
                },
            ],
            ..options(1)
        });
    let outcome = scheduler.run(&jobs(&["https://a.test/cart"], &[Viewport::desktop()])).await;

    assert_eq!(outcome.jobs_succeeded, 1);
    assert_eq!(*tracker.clicks.lock().unwrap(), vec!["#ok-accept-cookies"]);
    assert_eq!(
        *tracker.navigations.lock().unwrap(),
        vec!["https://a.test/cart", "https://a.test/checkout"]
    );
    // Analyzers see the page the journey ended on.
    assert!(outcome.findings.is_empty());
}

#[tokio::test]
async fn test_failing_journey_step_is_an_interaction_error() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));
    let tracker = Arc::clone(&browser.tracker);

    let scheduler = Scheduler::new(browser).with_options(SchedulerOptions {
        journey: vec![Step::Click {
            selector: "#add-to-cart".to_string(),
        }],
        ..options(1)
    });
    let outcome = scheduler.run(&jobs(&["https://a.test/"], &[Viewport::desktop()])).await;

    assert_eq!(outcome.jobs_succeeded, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].error.starts_with("interaction step failed"));
    assert!(outcome.errors[0].error.contains("#add-to-cart"));
    assert_eq!(tracker.open.load(Ordering::SeqCst), 0);
}

fn slow_job_fast_operations() -> SchedulerOptions {
    SchedulerOptions {
        timeouts: TimeoutConfig {
            operation_ms: 30,
            job_ms: 5_000,
            ..fast_timeouts()
        },
        ..options(1)
    }
}

#[tokio::test]
async fn test_hanging_analyzer_hits_operation_timeout() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));

    let scheduler = Scheduler::new(browser)
        .with_analyzer(Arc::new(SleepyAnalyzer))
        .with_options(slow_job_fast_operations());
    let outcome = scheduler.run(&jobs(&["https://a.test/"], &[Viewport::desktop()])).await;

    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].error.starts_with("analyzer 'sleepy' failed: operation timed out"));
}

#[tokio::test]
async fn test_hanging_journey_step_hits_operation_timeout() {
    let browser = Arc::new(FakeBrowser::new(&[("https://a.test/", Behavior::Serve(CLEAN_PAGE))]));

    let scheduler = Scheduler::new(browser).with_options(SchedulerOptions {
        journey: vec![Step::WaitForSelector {
            selector: "#never".to_string(),
            timeout_ms: None,
        }],
        ..slow_job_fast_operations()
    });
    let outcome = scheduler.run(&jobs(&["https://a.test/"], &[Viewport::desktop()])).await;

    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].error.starts_with("interaction step failed: operation timed out"));
}
