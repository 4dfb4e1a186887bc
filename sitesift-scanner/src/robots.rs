// robots.txt policy, fetched once per crawl and read-only afterwards

use reqwest::{Client, StatusCode};
use texting_robots::Robot;
use tracing::{debug, warn};
use url::Url;

/// Product token matched against `User-agent:` groups.
pub const ROBOTS_AGENT: &str = "sitesift";

/// Disallow rules of the group that applies to us, plus any `Sitemap:` directives.
///
/// Only the group naming our agent (or the `*` group when ours is absent) is
/// applied; a file whose groups name other agents leaves us unrestricted.
#[derive(Default)]
pub struct RobotsPolicy {
    robot: Option<Robot>,
    sitemaps: Vec<String>,
}

impl RobotsPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(body: &str) -> Self {
        match Robot::new(ROBOTS_AGENT, body.as_bytes()) {
            Ok(robot) => {
                let sitemaps = robot.sitemaps.clone();
                Self {
                    robot: Some(robot),
                    sitemaps,
                }
            }
            Err(e) => {
                warn!("Ignoring unparseable robots.txt: {}", e);
                Self::allow_all()
            }
        }
    }

    /// Fetch `/robots.txt` for the origin of `base`. Any failure means "no rules".
    pub async fn fetch(client: &Client, base: &Url) -> Self {
        let Ok(robots_url) = base.join("/robots.txt") else {
            return Self::allow_all();
        };
        debug!("Fetching {}", robots_url);

        let response = match client.get(robots_url.as_str()).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("robots.txt unavailable for {}: {}", base, e);
                return Self::allow_all();
            }
        };
        if response.status() != StatusCode::OK {
            debug!("robots.txt for {} returned {}", base, response.status());
            return Self::allow_all();
        }
        match response.text().await {
            Ok(body) => Self::parse(&body),
            Err(_) => Self::allow_all(),
        }
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        match &self.robot {
            Some(robot) => robot.allowed(url),
            None => true,
        }
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}
