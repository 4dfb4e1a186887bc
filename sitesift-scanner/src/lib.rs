pub mod crawler;
pub mod error;
pub mod normalize;
pub mod result;
pub mod robots;
pub mod sitemap;

pub use crawler::{CrawlQueueItem, Crawler, ProgressCallback};
pub use error::CrawlError;
pub use normalize::{UrlFilter, normalize_url};
pub use result::CrawlResult;
pub use robots::RobotsPolicy;
pub use sitemap::{SitemapFetcher, SitemapOptions};

/// User agent sent with every discovery request.
pub const USER_AGENT: &str = "sitesift/0.1 (+https://github.com/sitesift/sitesift)";
