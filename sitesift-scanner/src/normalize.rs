// URL canonicalization and allow/deny filtering shared by both discovery strategies

use regex::Regex;
use tracing::warn;
use url::Url;

/// Query parameters that only carry campaign/click tracking and never change the page.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "_ga", "yclid", "igshid",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonicalize a URL into the key used by visited sets.
///
/// Scheme and host are lowercased, default ports and fragments dropped,
/// tracking parameters removed, the remaining parameters sorted, and a
/// trailing slash stripped from every path except the root.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// Visited-set key: the normalized form, or the raw string when it doesn't parse.
pub fn visit_key(raw: &str) -> String {
    normalize_url(raw).unwrap_or_else(|| raw.to_string())
}

pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// True when the URL's host equals, or is a subdomain of, one of `allow_domains`.
/// An empty list allows every host.
pub fn domain_allowed(url: &str, allow_domains: &[String]) -> bool {
    if allow_domains.is_empty() {
        return true;
    }
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    else {
        return false;
    };
    allow_domains.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

/// A deny pattern; invalid regular expressions degrade to substring matching.
#[derive(Debug, Clone)]
pub enum DenyPattern {
    Regex(Regex),
    Substring(String),
}

impl DenyPattern {
    pub fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => DenyPattern::Regex(re),
            Err(e) => {
                warn!("Deny pattern {:?} is not a valid regex ({}), using substring match", pattern, e);
                DenyPattern::Substring(pattern.to_string())
            }
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            DenyPattern::Regex(re) => re.is_match(url),
            DenyPattern::Substring(s) => url.contains(s.as_str()),
        }
    }
}

/// Allow-domain and deny-pattern filter applied to every discovered URL.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    allow_domains: Vec<String>,
    deny: Vec<DenyPattern>,
}

impl UrlFilter {
    pub fn new(allow_domains: Vec<String>, deny_patterns: &[String]) -> Self {
        Self {
            allow_domains,
            deny: deny_patterns.iter().map(|p| DenyPattern::new(p)).collect(),
        }
    }

    pub fn allows(&self, url: &str) -> bool {
        domain_allowed(url, &self.allow_domains) && !self.deny.iter().any(|p| p.matches(url))
    }
}
