// Sitemap discovery: well-known locations, robots.txt `Sitemap:` directives, seed fallback

use crate::error::{CrawlError, Result};
use crate::normalize::UrlFilter;
use crate::robots::RobotsPolicy;
use flate2::read::GzDecoder;
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::time::Duration;
use sxd_document::{dom, parser};
use tracing::{debug, info, warn};
use url::Url;

/// Probed in order, relative to the site origin.
const SITEMAP_CANDIDATES: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-index.xml"];

/// Nested sitemap indexes deeper than this are ignored.
const MAX_INDEX_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    Index,
    Urlset,
}

impl SitemapKind {
    fn from_root(root: dom::Root<'_>) -> Option<Self> {
        let kind = root
            .children()
            .into_iter()
            .find_map(|child| child.element())?
            .name()
            .local_part()
            .to_string();

        match kind.as_str() {
            "sitemapindex" => Some(Self::Index),
            "urlset" => Some(Self::Urlset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SitemapOptions {
    pub max_urls: usize,
    pub allow_domains: Vec<String>,
    pub deny_patterns: Vec<String>,
    pub timeout: Duration,
}

impl Default for SitemapOptions {
    fn default() -> Self {
        Self {
            max_urls: 100,
            allow_domains: Vec::new(),
            deny_patterns: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Accumulates page URLs across a sitemap tree until `max_urls` is reached.
struct Accumulator {
    urls: Vec<String>,
    seen: HashSet<String>,
    max_urls: usize,
}

impl Accumulator {
    fn new(max_urls: usize) -> Self {
        Self {
            urls: Vec::new(),
            seen: HashSet::new(),
            max_urls,
        }
    }

    fn is_full(&self) -> bool {
        self.urls.len() >= self.max_urls
    }

    fn push(&mut self, url: String) {
        if !self.is_full() && self.seen.insert(url.clone()) {
            self.urls.push(url);
        }
    }
}

pub struct SitemapFetcher {
    client: Client,
    filter: UrlFilter,
    max_urls: usize,
}

impl SitemapFetcher {
    pub fn new(options: SitemapOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(1))
            .build()?;

        Ok(Self {
            client,
            filter: UrlFilter::new(options.allow_domains, &options.deny_patterns),
            max_urls: options.max_urls,
        })
    }

    /// Discover page URLs for a site. Never fails: when no sitemap yields
    /// anything the result is `[base_url]`.
    pub async fn discover(&self, base_url: &str) -> Vec<String> {
        let fallback = vec![base_url.to_string()];
        if self.max_urls == 0 {
            return Vec::new();
        }
        let Ok(base) = Url::parse(base_url) else {
            warn!("Cannot parse {} for sitemap discovery, using it as-is", base_url);
            return fallback;
        };

        for candidate in SITEMAP_CANDIDATES {
            let Ok(sitemap_url) = base.join(candidate) else {
                continue;
            };
            let urls = self.resolve(sitemap_url.as_str()).await;
            if !urls.is_empty() {
                info!("Sitemap {} yielded {} URLs", sitemap_url, urls.len());
                return urls;
            }
        }

        let robots = RobotsPolicy::fetch(&self.client, &base).await;
        for sitemap_url in robots.sitemaps() {
            let urls = self.resolve(sitemap_url).await;
            if !urls.is_empty() {
                info!("robots.txt sitemap {} yielded {} URLs", sitemap_url, urls.len());
                return urls;
            }
        }

        info!("No sitemap found for {}, falling back to the seed URL", base_url);
        fallback
    }

    async fn resolve(&self, sitemap_url: &str) -> Vec<String> {
        let mut acc = Accumulator::new(self.max_urls);
        self.collect(sitemap_url, &mut acc, 0).await;
        acc.urls
    }

    fn collect<'a>(
        &'a self,
        sitemap_url: &'a str,
        acc: &'a mut Accumulator,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if acc.is_full() {
                return;
            }
            let xml = match self.download(sitemap_url).await {
                Ok(xml) => xml,
                Err(e) => {
                    debug!("Sitemap {} not found: {}", sitemap_url, e);
                    return;
                }
            };
            let (kind, locs) = match parse_sitemap(&xml) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping sitemap {}: {}", sitemap_url, e);
                    return;
                }
            };

            match kind {
                SitemapKind::Index => {
                    if depth >= MAX_INDEX_DEPTH {
                        warn!("Sitemap index nesting too deep at {}", sitemap_url);
                        return;
                    }
                    for child in locs {
                        if acc.is_full() {
                            debug!("Reached {} URLs, not descending further", acc.max_urls);
                            break;
                        }
                        self.collect(&child, acc, depth + 1).await;
                    }
                }
                SitemapKind::Urlset => {
                    for loc in locs {
                        if acc.is_full() {
                            break;
                        }
                        if self.filter.allows(&loc) {
                            acc.push(loc);
                        }
                    }
                }
            }
        })
    }

    /// Fetch a sitemap body; anything other than a 200 is an error.
    async fn download(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.starts_with(&[0x1f, 0x8b]) {
            let mut gz = GzDecoder::new(&bytes[..]);
            let mut body = String::new();
            gz.read_to_string(&mut body)?;
            Ok(body)
        } else {
            String::from_utf8(bytes.to_vec()).map_err(|e| CrawlError::ParseError(e.to_string()))
        }
    }
}

/// Parse a sitemap document into its kind and every `<loc>` value, namespaced or not.
pub fn parse_sitemap(xml: &str) -> Result<(SitemapKind, Vec<String>)> {
    let package = parser::parse(xml).map_err(|e| CrawlError::ParseError(e.to_string()))?;
    let document = package.as_document();

    let kind = SitemapKind::from_root(document.root())
        .ok_or_else(|| CrawlError::ParseError("root is neither <urlset> nor <sitemapindex>".into()))?;

    let factory = sxd_xpath::Factory::new();
    let xpath = factory
        .build("//*[local-name()='loc']")
        .map_err(|e| CrawlError::ParseError(e.to_string()))?
        .ok_or_else(|| CrawlError::ParseError("Missing XPath".into()))?;
    let context = sxd_xpath::Context::new();
    let value = xpath
        .evaluate(&context, document.root())
        .map_err(|e| CrawlError::ParseError(e.to_string()))?;

    let mut locs = Vec::new();
    if let sxd_xpath::Value::Nodeset(nodes) = value {
        for node in nodes.document_order() {
            let loc = node.string_value().trim().to_string();
            if !loc.is_empty() {
                locs.push(loc);
            }
        }
    }
    Ok((kind, locs))
}
