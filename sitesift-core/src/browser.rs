// Browser automation seam. One shared `Browser` hands out isolated contexts;
// each scan job owns exactly one context and closes it when done.

use crate::data::Viewport;
use crate::error::BrowserError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Parameters for a fresh browsing context.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub viewport: Viewport,
    pub locale: String,
    pub cookies: Vec<Cookie>,
    pub extra_headers: BTreeMap<String, String>,
}

impl ContextOptions {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            locale: "en-US".to_string(),
            cookies: Vec::new(),
            extra_headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_context(&self, options: ContextOptions) -> BrowserResult<Box<dyn BrowserContext>>;
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Box<dyn Page>>;

    /// Discards cookies and storage. Pages of a closed context stop working.
    async fn close(&self) -> BrowserResult<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> BrowserResult<()>;

    async fn content(&self) -> BrowserResult<String>;

    async fn evaluate(&self, script: &str, args: serde_json::Value) -> BrowserResult<serde_json::Value>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> BrowserResult<()>;

    async fn element_screenshot(&self, selector: &str, path: &Path) -> BrowserResult<()>;

    /// `None` when the element exists but is not rendered.
    async fn bounding_box(&self, selector: &str) -> BrowserResult<Option<BoundingBox>>;

    async fn fill(&self, selector: &str, text: &str) -> BrowserResult<()>;

    async fn click(&self, selector: &str) -> BrowserResult<()>;

    async fn press(&self, key: &str) -> BrowserResult<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()>;
}
