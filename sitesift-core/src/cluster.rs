// Finding signatures and clustering.
//
// Normalization is heuristic: it can over-merge unrelated issues that share
// a normalized selector, or under-merge the same issue when markup differs.

use crate::data::{ClusteredFinding, Finding};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use url::Url;

static POSITIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":(?:nth-child|nth-of-type|nth-last-child|nth-last-of-type)\([^)]*\)|:first-child|:last-child")
        .expect("static regex")
});
static NUMBERED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z_][\w-]*?)[-_]?\d+\b").expect("static regex"));
static INDEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static HEX_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F-]{8,}$").expect("static regex"));

/// Strips positional pseudo-classes and collapses numbering so the same
/// element on different page instances yields the same selector.
pub fn normalize_selector(selector: &str) -> String {
    let s = POSITIONAL.replace_all(selector, "");
    let s = NUMBERED_ID.replace_all(&s, "#${1}-N");
    let s = INDEX.replace_all(&s, "[N]");
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

fn is_id_like(segment: &str) -> bool {
    HEX_ID.is_match(segment) && segment.chars().any(|c| c.is_ascii_digit())
}

/// Host plus path, with numeric segments as `:n` and hash/uuid-like
/// segments as `:id`. The query and fragment are ignored.
pub fn normalize_url_pattern(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    let segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if segment.chars().all(|c| c.is_ascii_digit()) {
                ":n".to_string()
            } else if is_id_like(segment) {
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();

    format!("{}/{}", host, segments.join("/"))
}

/// Stable fingerprint of rule, normalized selector, viewport and URL pattern.
pub fn signature(finding: &Finding) -> String {
    let selector = finding
        .evidence
        .selectors
        .first()
        .map(|s| normalize_selector(s))
        .unwrap_or_default();

    let key = [
        finding.rule_id.as_str(),
        selector.as_str(),
        finding.viewport.as_str(),
        normalize_url_pattern(&finding.page_url).as_str(),
    ]
    .join("\u{1f}");

    let digest = Sha256::digest(format!("{}:{}", finding.tool, key).as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Groups findings by signature. The first finding of each group is its
/// representative; groups keep first-seen order.
pub fn cluster_findings(findings: &[Finding]) -> Vec<ClusteredFinding> {
    let mut clusters: Vec<ClusteredFinding> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut pages_seen: Vec<HashSet<String>> = Vec::new();

    for finding in findings {
        let sig = signature(finding);
        match index.get(&sig) {
            Some(&i) => {
                let cluster = &mut clusters[i];
                cluster.occurrence_count += 1;
                if pages_seen[i].insert(finding.page_url.clone()) {
                    cluster.affected_pages.push(finding.page_url.clone());
                }
            }
            None => {
                index.insert(sig.clone(), clusters.len());
                pages_seen.push(HashSet::from([finding.page_url.clone()]));
                clusters.push(ClusteredFinding {
                    finding: finding.clone(),
                    signature: sig,
                    affected_pages: vec![finding.page_url.clone()],
                    occurrence_count: 1,
                    representative_url: finding.page_url.clone(),
                });
            }
        }
    }

    clusters
}

/// Worst first: severity rank, then most occurrences.
pub fn sort_clusters(clusters: &mut [ClusteredFinding]) {
    clusters.sort_by(|a, b| {
        a.finding
            .severity
            .rank()
            .cmp(&b.finding.severity.rank())
            .then_with(|| b.occurrence_count.cmp(&a.occurrence_count))
    });
}

/// The `n` most important clusters by severity, then confidence.
pub fn top_findings(clusters: &[ClusteredFinding], n: usize) -> Vec<ClusteredFinding> {
    let mut ranked: Vec<ClusteredFinding> = clusters.to_vec();
    ranked.sort_by_key(|c| (c.finding.severity.rank(), c.finding.confidence.rank()));
    ranked.truncate(n);
    ranked
}
