use crate::error::{CrawlError, Result};
use crate::normalize::{UrlFilter, same_origin, visit_key};
use crate::result::CrawlResult;
use crate::robots::RobotsPolicy;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Called with (pages discovered so far, url) each time a page is recorded.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

/// A discovered link waiting in the frontier. Created once, consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlQueueItem {
    pub url: String,
    pub depth: usize,
    pub referrer: Option<String>,
}

/// Breadth-first, same-origin crawler.
///
/// Visited and robots state belong to the instance and survive between
/// calls to [`Crawler::crawl`] until [`Crawler::reset`] is called, so one
/// instance can process several seeds in sequence without cross-talk.
pub struct Crawler {
    client: Client,
    visited: HashSet<String>,
    robots: Option<RobotsPolicy>,
    max_depth: usize,
    max_pages: usize,
    same_origin: bool,
    respect_robots: bool,
    filter: UrlFilter,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new() -> Result<Self> {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_max_idle_per_host(10)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            visited: HashSet::new(),
            robots: None,
            max_depth: 3,
            max_pages: 50,
            same_origin: true,
            respect_robots: true,
            filter: UrlFilter::default(),
            progress_callback: None,
        })
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_same_origin(mut self, same_origin: bool) -> Self {
        self.same_origin = same_origin;
        self
    }

    pub fn with_respect_robots(mut self, respect: bool) -> Self {
        self.respect_robots = respect;
        self
    }

    pub fn with_filter(mut self, filter: UrlFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Forget every visited page and the robots rules of the previous crawl.
    pub fn reset(&mut self) {
        self.visited.clear();
        self.robots = None;
    }

    pub fn get_visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Crawl from `seed`, returning discovered pages in breadth-first order.
    ///
    /// Stops when the frontier is empty or `max_pages` pages were recorded.
    /// Pages that fail to load are recorded with their error and the crawl
    /// moves on.
    pub async fn crawl(&mut self, seed: &str) -> Result<Vec<CrawlResult>> {
        let seed_url =
            Url::parse(seed).map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", seed, e)))?;
        info!(
            "Starting crawl of {} (max depth {}, max pages {})",
            seed, self.max_depth, self.max_pages
        );

        let mut results = Vec::new();
        if self.max_pages == 0 {
            return Ok(results);
        }

        self.robots = Some(if self.respect_robots {
            RobotsPolicy::fetch(&self.client, &seed_url).await
        } else {
            RobotsPolicy::allow_all()
        });

        let mut queue: VecDeque<CrawlQueueItem> = VecDeque::new();
        let mut enqueued: HashSet<String> = HashSet::new();
        enqueued.insert(visit_key(seed));
        queue.push_back(CrawlQueueItem {
            url: seed.to_string(),
            depth: 0,
            referrer: None,
        });

        while let Some(item) = queue.pop_front() {
            let key = visit_key(&item.url);
            if self.visited.contains(&key) {
                debug!("Already visited {}", item.url);
                continue;
            }
            if item.depth > self.max_depth {
                continue;
            }
            if !self.robots_allow(&item.url) {
                debug!("Disallowed by robots.txt: {}", item.url);
                continue;
            }
            if !self.filter.allows(&item.url) {
                debug!("Filtered out: {}", item.url);
                continue;
            }

            self.visited.insert(key);
            let mut result = CrawlResult::new(&item);

            if let Some(ref callback) = self.progress_callback {
                callback(results.len() + 1, item.url.clone());
            }

            if results.len() + 1 >= self.max_pages {
                results.push(result);
                info!("Reached max pages ({}), stopping crawl", self.max_pages);
                break;
            }

            if item.depth == self.max_depth {
                results.push(result);
                continue;
            }

            match self.fetch_links(&item.url).await {
                Ok((status, links)) => {
                    result.status_code = Some(status);
                    result.links_found = links.len();
                    for link in links {
                        if !self.should_enqueue(&seed_url, &link) {
                            continue;
                        }
                        let link_key = visit_key(&link);
                        if self.visited.contains(&link_key) || !enqueued.insert(link_key) {
                            continue;
                        }
                        queue.push_back(CrawlQueueItem {
                            url: link,
                            depth: item.depth + 1,
                            referrer: Some(item.url.clone()),
                        });
                    }
                }
                Err(e) => {
                    warn!("Crawl error for {}: {}", item.url, e);
                    result.error = Some(e.to_string());
                }
            }
            results.push(result);
        }

        info!("Crawl complete. Discovered {} pages", results.len());
        Ok(results)
    }

    fn robots_allow(&self, url: &str) -> bool {
        self.robots.as_ref().map(|r| r.is_allowed(url)).unwrap_or(true)
    }

    fn should_enqueue(&self, seed: &Url, link: &str) -> bool {
        if self.same_origin {
            match Url::parse(link) {
                Ok(parsed) if same_origin(seed, &parsed) => {}
                _ => return false,
            }
        }
        self.filter.allows(link)
    }

    async fn fetch_links(&self, url: &str) -> Result<(u16, Vec<String>)> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(false);
        if !is_html {
            return Ok((status.as_u16(), Vec::new()));
        }

        // Relative links resolve against where the redirects ended up
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((status.as_u16(), extract_links(&body, &final_url)))
    }
}

/// Absolute, fragment-free targets of every `<a href>` in `html`, resolved against `page_url`.
pub fn extract_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&LINK_SELECTOR) {
        if let Some(href) = element.value().attr("href")
            && let Some(absolute) = resolve_url(&base, href)
            && seen.insert(absolute.clone())
        {
            links.push(absolute);
        }
    }
    links
}

fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}
