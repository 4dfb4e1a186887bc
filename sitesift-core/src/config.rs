// Scan configuration: the optional JSON file plus the resolved run settings

use crate::analyzer::CustomRule;
use crate::browser::Cookie;
use crate::data::Viewport;
use crate::error::ConfigError;
use crate::steps::Step;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_MAX_PAGES: usize = 50;
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// How each job authenticates before navigating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    Cookies { cookies: Vec<Cookie> },
    Headers { headers: BTreeMap<String, String> },
    Login { steps: Vec<Step> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_ms: u64,
    /// Ceiling for each interaction, analyzer run and screenshot.
    pub operation_ms: u64,
    pub stability_interval_ms: u64,
    pub stability_timeout_ms: u64,
    pub job_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            operation_ms: 30_000,
            stability_interval_ms: 500,
            stability_timeout_ms: 10_000,
            job_ms: 180_000,
        }
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn operation(&self) -> Duration {
        Duration::from_millis(self.operation_ms)
    }

    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_interval_ms)
    }

    pub fn stability_timeout(&self) -> Duration {
        Duration::from_millis(self.stability_timeout_ms)
    }

    pub fn job(&self) -> Duration {
        Duration::from_millis(self.job_ms)
    }

    fn validate(&self) -> Result<()> {
        let checks = [
            ("timeouts.navigation_ms", self.navigation_ms),
            ("timeouts.operation_ms", self.operation_ms),
            ("timeouts.stability_interval_ms", self.stability_interval_ms),
            ("timeouts.stability_timeout_ms", self.stability_timeout_ms),
            ("timeouts.job_ms", self.job_ms),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Contents of `--config <PATH>`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Extra presets, or overrides of the built-in ones by name.
    pub viewports: Vec<Viewport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    pub journey: Vec<Step>,
    pub allow_domains: Vec<String>,
    pub deny_patterns: Vec<String>,
    pub custom_rules: Vec<CustomRule>,
    pub timeouts: TimeoutConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON array of custom rules.
pub fn load_rules(path: &Path) -> Result<Vec<CustomRule>> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Turns viewport names into presets. Config-defined presets shadow the
/// built-ins; repeated names are kept once.
pub fn resolve_viewports(names: &[String], custom: &[Viewport]) -> Result<Vec<Viewport>> {
    let mut resolved: Vec<Viewport> = Vec::new();

    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let viewport = custom
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .cloned()
            .or_else(|| Viewport::preset(name))
            .ok_or_else(|| ConfigError::UnknownViewport(name.to_string()))?;

        if !resolved.iter().any(|v| v.name == viewport.name) {
            resolved.push(viewport);
        }
    }

    Ok(resolved)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    #[default]
    Single,
    Sitemap,
    Bfs,
    Journey,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlMode::Single => "single",
            CrawlMode::Sitemap => "sitemap",
            CrawlMode::Bfs => "bfs",
            CrawlMode::Journey => "journey",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(CrawlMode::Single),
            "sitemap" => Ok(CrawlMode::Sitemap),
            "bfs" => Ok(CrawlMode::Bfs),
            "journey" => Ok(CrawlMode::Journey),
            other => Err(ConfigError::InvalidValue {
                field: "mode",
                reason: format!("'{}' is not one of single, sitemap, bfs, journey", other),
            }),
        }
    }
}

/// Everything a scan run needs, after CLI flags have been merged over the file.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub seeds: Vec<String>,
    pub mode: CrawlMode,
    pub max_pages: usize,
    pub max_depth: usize,
    pub viewports: Vec<Viewport>,
    pub concurrency: usize,
    pub respect_robots: bool,
    pub file: FileConfig,
}

impl ScanConfig {
    pub fn new(seeds: Vec<String>) -> Self {
        Self {
            seeds,
            mode: CrawlMode::default(),
            max_pages: DEFAULT_MAX_PAGES,
            max_depth: DEFAULT_MAX_DEPTH,
            viewports: vec![Viewport::desktop()],
            concurrency: DEFAULT_CONCURRENCY,
            respect_robots: true,
            file: FileConfig::default(),
        }
    }

    pub fn locale(&self) -> &str {
        self.file.locale.as_deref().unwrap_or("en-US")
    }

    /// Rejects settings the run cannot proceed with.
    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "url",
                reason: "at least one seed URL is required".to_string(),
            });
        }
        for seed in &self.seeds {
            let parsed = Url::parse(seed).map_err(|e| ConfigError::InvalidValue {
                field: "url",
                reason: format!("'{}': {}", seed, e),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    field: "url",
                    reason: format!("'{}' is not an http(s) URL", seed),
                });
            }
        }
        if self.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_pages",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.viewports.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "viewports",
                reason: "at least one viewport is required".to_string(),
            });
        }
        if let Some(v) = self.viewports.iter().find(|v| v.width == 0 || v.height == 0) {
            return Err(ConfigError::InvalidValue {
                field: "viewports",
                reason: format!("'{}' has a zero dimension", v.name),
            });
        }
        if self.mode == CrawlMode::Journey && self.file.journey.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "journey",
                reason: "journey mode needs interaction steps in the config file".to_string(),
            });
        }
        if let Some(AuthConfig::Login { steps }) = &self.file.auth
            && steps.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "auth",
                reason: "login auth needs at least one step".to_string(),
            });
        }
        self.file.timeouts.validate()
    }
}
