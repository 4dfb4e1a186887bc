// URL x viewport job matrix

use crate::data::Viewport;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sitesift_scanner::normalize::visit_key;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJob {
    pub url: String,
    pub viewport: Viewport,
}

impl ScanJob {
    pub fn new(url: &str, viewport: &Viewport) -> Self {
        Self {
            url: url.to_string(),
            viewport: viewport.clone(),
        }
    }

    /// Filesystem-safe name for this job's artifacts, unique per url/viewport.
    pub fn slug(&self) -> String {
        let location = self.url.split("://").last().unwrap_or(&self.url);
        let readable: String = sanitize(location).chars().take(60).collect();

        let digest = Sha256::digest(format!("{}|{}", self.url, self.viewport.name).as_bytes());
        let short: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();

        format!("{}-{}-{}", readable, sanitize(&self.viewport.name), short)
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

impl fmt::Display for ScanJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.url, self.viewport.name)
    }
}

/// Cross product of the deduplicated URLs and the viewports, URL-major:
/// every viewport of the first URL, then every viewport of the second.
pub fn build_job_matrix(urls: &[String], viewports: &[Viewport]) -> Vec<ScanJob> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(urls.len() * viewports.len());

    for url in urls {
        if !seen.insert(visit_key(url)) {
            continue;
        }
        for viewport in viewports {
            jobs.push(ScanJob::new(url, viewport));
        }
    }

    jobs
}
