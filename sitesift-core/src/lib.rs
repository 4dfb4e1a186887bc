pub mod analyzer;
pub mod browser;
pub mod cluster;
pub mod config;
pub mod crawl;
pub mod data;
pub mod error;
pub mod http_browser;
pub mod jobs;
pub mod report;
pub mod scheduler;
pub mod steps;

pub use analyzer::{Analyzer, CustomRule, CustomRuleAnalyzer, MarkupAnalyzer};
pub use browser::{Browser, BrowserContext, ContextOptions, Page};
pub use cluster::{cluster_findings, signature, sort_clusters, top_findings};
pub use config::{CrawlMode, FileConfig, ScanConfig};
pub use data::{ClusteredFinding, Finding, ScanError, Severity, Viewport};
pub use http_browser::HttpBrowser;
pub use jobs::{ScanJob, build_job_matrix};
pub use scheduler::{ScanOutcome, Scheduler, SchedulerOptions};

const BANNER: &str = r#"
       _ __            _ ______
  ___ (_) /____  ___  (_) _/ /_
 (_-</ / __/ -_)(_-< / / _/ __/
/___/_/\__/\__//___//_/_/ \__/
"#;

pub fn print_banner() {
    println!("{}", BANNER);
    println!(
        "  sitesift v{} - finds the few UX problems worth fixing\n",
        env!("CARGO_PKG_VERSION")
    );
}
