use crate::config::CrawlMode;
use indicatif::{ProgressBar, ProgressStyle};
use sitesift_scanner::error::Result;
use sitesift_scanner::normalize::visit_key;
use sitesift_scanner::{Crawler, SitemapFetcher, SitemapOptions, UrlFilter};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};
use url::Url;

/// Options for discovering the page set of a run
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub seeds: Vec<String>,
    pub mode: CrawlMode,
    pub max_pages: usize,
    pub max_depth: usize,
    pub allow_domains: Vec<String>,
    pub deny_patterns: Vec<String>,
    pub respect_robots: bool,
    pub show_progress_bars: bool,
}

impl DiscoveryOptions {
    pub fn new(seeds: Vec<String>, mode: CrawlMode) -> Self {
        Self {
            seeds,
            mode,
            max_pages: crate::config::DEFAULT_MAX_PAGES,
            max_depth: crate::config::DEFAULT_MAX_DEPTH,
            allow_domains: Vec::new(),
            deny_patterns: Vec::new(),
            respect_robots: true,
            show_progress_bars: false,
        }
    }
}

/// Callback for reporting discovery progress
pub type DiscoveryProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

/// Resolve the page set for a run. Per-seed failures fall back or are skipped;
/// only building the HTTP clients can fail.
pub async fn discover_urls(
    options: &DiscoveryOptions,
    progress_callback: Option<DiscoveryProgressCallback>,
) -> Result<Vec<String>> {
    let progress_bar = if options.show_progress_bars {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Discovering pages ({} mode)...", options.mode));
        Some(pb)
    } else {
        None
    };

    let report = |msg: String| {
        if let Some(ref callback) = progress_callback {
            callback(msg);
        }
    };

    let mut discovered: Vec<String> = Vec::new();

    match options.mode {
        CrawlMode::Single | CrawlMode::Journey => {
            discovered.extend(options.seeds.iter().cloned());
        }
        CrawlMode::Sitemap => {
            // Without an explicit allow list, stay on the seeds' own hosts.
            let allow_domains = if options.allow_domains.is_empty() {
                options.seeds.iter().filter_map(|s| host_of(s)).collect()
            } else {
                options.allow_domains.clone()
            };
            let fetcher = SitemapFetcher::new(SitemapOptions {
                max_urls: options.max_pages,
                allow_domains,
                deny_patterns: options.deny_patterns.clone(),
                ..SitemapOptions::default()
            })?;

            for (idx, seed) in options.seeds.iter().enumerate() {
                report(format!("Reading sitemap {}/{}: {}", idx + 1, options.seeds.len(), seed));
                let urls = fetcher.discover(seed).await;
                info!("Sitemap discovery for {} found {} URLs", seed, urls.len());
                discovered.extend(urls);
            }
        }
        CrawlMode::Bfs => {
            let processed = Arc::new(AtomicUsize::new(0));
            let mut crawler = Crawler::new()?
                .with_max_depth(options.max_depth)
                .with_max_pages(options.max_pages)
                .with_respect_robots(options.respect_robots)
                .with_filter(UrlFilter::new(options.allow_domains.clone(), &options.deny_patterns));

            if let Some(ref pb) = progress_bar {
                let pb = pb.clone();
                let count = Arc::clone(&processed);
                crawler = crawler.with_progress_callback(Arc::new(move |_discovered: usize, _url: String| {
                    let n = count.fetch_add(1, Ordering::Relaxed) + 1;
                    pb.set_message(format!("Crawling... {} pages discovered", n));
                    pb.tick();
                }));
            }

            for (idx, seed) in options.seeds.iter().enumerate() {
                if options.seeds.len() > 1 {
                    report(format!("Crawling host {}/{}: {}", idx + 1, options.seeds.len(), seed));
                }
                crawler.reset();
                match crawler.crawl(seed).await {
                    Ok(results) => discovered.extend(results.into_iter().map(|r| r.url)),
                    Err(e) => {
                        warn!("Failed to crawl {}: {}", seed, e);
                        report(format!("[!]  Failed to crawl {}: {}", seed, e));
                    }
                }
            }
        }
    }

    let mut seen = HashSet::new();
    let mut urls: Vec<String> = discovered
        .into_iter()
        .filter(|url| seen.insert(visit_key(url)))
        .collect();
    urls.truncate(options.max_pages);

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!("Discovery complete! {} pages", urls.len()));
    }

    Ok(urls)
}

/// Human-readable listing of discovered URLs grouped by host
pub fn generate_discovery_report(urls: &[String]) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Pages discovered: {}\n", urls.len()));
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    let mut by_host: BTreeMap<String, Vec<&String>> = BTreeMap::new();
    for url in urls {
        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        by_host.entry(host).or_default().push(url);
    }

    for (host, host_urls) in &by_host {
        report.push_str(&format!("## {}\n", host));
        report.push_str(&format!("  {} pages found\n\n", host_urls.len()));
        for url in host_urls {
            report.push_str(&format!("  {}\n", extract_url_path(url)));
        }
        report.push('\n');
    }

    report
}
