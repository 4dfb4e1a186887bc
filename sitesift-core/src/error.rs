use std::path::PathBuf;
use thiserror::Error;

/// Setup problems. Any of these stops the run before crawling starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Custom rule '{rule}' has an invalid selector '{selector}': {reason}")]
    InvalidSelector {
        rule: String,
        selector: String,
        reason: String,
    },

    #[error("Custom rule #{index} has an empty id")]
    EmptyRuleId { index: usize },

    #[error("Duplicate custom rule id '{0}'")]
    DuplicateRule(String),

    #[error("Unknown viewport preset '{0}' (known: desktop, tablet, mobile, or define it in the config)")]
    UnknownViewport(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failures reported by a browser backend.
#[derive(Error, Debug, Clone)]
pub enum BrowserError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("script failed: {0}")]
    Script(String),

    #[error("no element matches '{0}'")]
    ElementNotFound(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("{0} is not supported by this browser backend")]
    Unsupported(&'static str),

    #[error("page has no content yet")]
    NoContent,

    #[error("browsing context is closed")]
    ContextClosed,

    #[error("browser error: {0}")]
    Other(String),
}

/// Why one scan job failed. Recorded as a `ScanError`, never propagated.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("could not open browsing context: {0}")]
    Context(#[source] BrowserError),

    #[error("authentication failed: {0}")]
    Auth(#[source] BrowserError),

    #[error("navigation failed: {0}")]
    Navigation(#[source] BrowserError),

    #[error("interaction step failed: {0}")]
    Interaction(#[source] BrowserError),

    #[error("analyzer '{name}' failed: {source}")]
    Analyzer {
        name: String,
        #[source]
        source: BrowserError,
    },

    #[error("job exceeded its {0:?} budget")]
    Timeout(std::time::Duration),

    #[error("job panicked: {0}")]
    Panicked(String),
}
