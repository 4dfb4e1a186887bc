// Browser backend over plain HTTP. Pages are fetched with reqwest, one cookie
// jar per context; nothing is rendered and no script runs, so evaluation,
// screenshots and input return `BrowserError::Unsupported`.

use crate::browser::{
    BoundingBox, Browser, BrowserContext, BrowserResult, ContextOptions, Cookie, Page, WaitUntil,
};
use crate::error::BrowserError;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue};
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLICK_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBrowser {
    user_agent: String,
}

impl Default for HttpBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBrowser {
    pub fn new() -> Self {
        Self {
            user_agent: sitesift_scanner::USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

fn cookie_jar(cookies: &[Cookie]) -> BrowserResult<Jar> {
    let jar = Jar::default();
    for cookie in cookies {
        let scope = format!("http://{}{}", cookie.domain.trim_start_matches('.'), cookie.path);
        let url = Url::parse(&scope)
            .map_err(|e| BrowserError::Other(format!("cookie '{}' has a bad domain: {}", cookie.name, e)))?;
        jar.add_cookie_str(
            &format!("{}={}; Path={}", cookie.name, cookie.value, cookie.path),
            &url,
        );
    }
    Ok(jar)
}

fn default_headers(options: &ContextOptions) -> BrowserResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&options.locale) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }
    for (name, value) in &options.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BrowserError::Other(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BrowserError::Other(format!("invalid value for header '{}': {}", name.as_str(), e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn new_context(&self, options: ContextOptions) -> BrowserResult<Box<dyn BrowserContext>> {
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .cookie_provider(Arc::new(cookie_jar(&options.cookies)?))
            .default_headers(default_headers(&options)?)
            .build()
            .map_err(|e| BrowserError::Other(e.to_string()))?;

        debug!("Opened HTTP context for viewport {}", options.viewport.name);
        Ok(Box::new(HttpContext {
            client,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct HttpContext {
    client: reqwest::Client,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserContext for HttpContext {
    async fn new_page(&self) -> BrowserResult<Box<dyn Page>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::ContextClosed);
        }
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            closed: Arc::clone(&self.closed),
            document: Mutex::new(None),
        }))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct LoadedDocument {
    url: String,
    body: String,
}

struct HttpPage {
    client: reqwest::Client,
    closed: Arc<AtomicBool>,
    document: Mutex<Option<LoadedDocument>>,
}

impl HttpPage {
    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrowserError::ContextClosed)
        } else {
            Ok(())
        }
    }

    async fn has_match(&self, selector: &Selector) -> BrowserResult<bool> {
        let body = self.content().await?;
        Ok(Html::parse_document(&body).select(selector).next().is_some())
    }
}

#[async_trait]
impl Page for HttpPage {
    async fn goto(&self, url: &str, _wait_until: WaitUntil, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;

        let navigation_error = |reason: String| BrowserError::Navigation {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrowserError::Timeout(timeout)
                } else {
                    navigation_error(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(navigation_error(format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| navigation_error(e.to_string()))?;

        *self.document.lock().await = Some(LoadedDocument { url: final_url, body });
        Ok(())
    }

    async fn content(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        self.document
            .lock()
            .await
            .as_ref()
            .map(|doc| doc.body.clone())
            .ok_or(BrowserError::NoContent)
    }

    async fn evaluate(&self, _script: &str, _args: serde_json::Value) -> BrowserResult<serde_json::Value> {
        Err(BrowserError::Unsupported("evaluate"))
    }

    async fn screenshot(&self, _path: &Path, _full_page: bool) -> BrowserResult<()> {
        Err(BrowserError::Unsupported("screenshot"))
    }

    async fn element_screenshot(&self, _selector: &str, _path: &Path) -> BrowserResult<()> {
        Err(BrowserError::Unsupported("element screenshot"))
    }

    async fn bounding_box(&self, _selector: &str) -> BrowserResult<Option<BoundingBox>> {
        Err(BrowserError::Unsupported("bounding box"))
    }

    async fn fill(&self, _selector: &str, _text: &str) -> BrowserResult<()> {
        Err(BrowserError::Unsupported("fill"))
    }

    /// Follows the `href` of the first matching link; other clicks are unsupported.
    async fn click(&self, selector: &str) -> BrowserResult<()> {
        let parsed = Selector::parse(selector).map_err(|e| BrowserError::Script(e.to_string()))?;
        let target = {
            let guard = self.document.lock().await;
            let doc = guard.as_ref().ok_or(BrowserError::NoContent)?;
            let html = Html::parse_document(&doc.body);
            let element = html
                .select(&parsed)
                .next()
                .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))?;
            match element.value().attr("href") {
                Some(href) if element.value().name() == "a" => Url::parse(&doc.url)
                    .and_then(|base| base.join(href))
                    .map_err(|e| BrowserError::Other(e.to_string()))?,
                _ => return Err(BrowserError::Unsupported("click on a non-link element")),
            }
        };
        self.goto(target.as_str(), WaitUntil::Load, CLICK_NAVIGATION_TIMEOUT).await
    }

    async fn press(&self, _key: &str) -> BrowserResult<()> {
        Err(BrowserError::Unsupported("keyboard input"))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let parsed = Selector::parse(selector).map_err(|e| BrowserError::Script(e.to_string()))?;
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_match(&parsed).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::ElementNotFound(selector.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
