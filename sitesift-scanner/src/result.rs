use crate::crawler::CrawlQueueItem;
use serde::{Deserialize, Serialize};

/// One discovered page, recorded in discovery (breadth-first) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub depth: usize,
    pub referrer: Option<String>,
    pub status_code: Option<u16>,
    pub links_found: usize,
    pub error: Option<String>,
}

impl CrawlResult {
    pub fn new(item: &CrawlQueueItem) -> Self {
        Self {
            url: item.url.clone(),
            depth: item.depth,
            referrer: item.referrer.clone(),
            status_code: None,
            links_found: 0,
            error: None,
        }
    }
}
