// Scripted login and interaction plans

use crate::browser::{BrowserResult, Page, WaitUntil};
use crate::error::BrowserError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// One browser action. Plans are deserialized from config as
/// `{"action": "click", "selector": "#submit"}` objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Step {
    Navigate {
        url: String,
    },
    Type {
        selector: String,
        text: String,
    },
    Click {
        selector: String,
    },
    Wait {
        ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    WaitForSelector {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Press {
        key: String,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Navigate { url } => write!(f, "navigate {}", url),
            // Typed text may be a credential.
            Step::Type { selector, .. } => write!(f, "type into {}", selector),
            Step::Click { selector } => write!(f, "click {}", selector),
            Step::Wait { ms } => write!(f, "wait {}ms", ms),
            Step::WaitForSelector { selector, .. } => write!(f, "wait for {}", selector),
            Step::Press { key } => write!(f, "press {}", key),
        }
    }
}

impl Step {
    fn budget(&self, timeout: Duration) -> Duration {
        match self {
            Step::Wait { ms } => timeout + Duration::from_millis(*ms),
            Step::WaitForSelector {
                timeout_ms: Some(ms),
                ..
            } => timeout + Duration::from_millis(*ms),
            _ => timeout,
        }
    }

    pub async fn run(&self, page: &dyn Page, timeout: Duration) -> BrowserResult<()> {
        match self {
            Step::Navigate { url } => page.goto(url, WaitUntil::Load, timeout).await,
            Step::Type { selector, text } => page.fill(selector, text).await,
            Step::Click { selector } => page.click(selector).await,
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Step::WaitForSelector {
                selector,
                timeout_ms,
            } => {
                let limit = timeout_ms.map(Duration::from_millis).unwrap_or(timeout);
                page.wait_for_selector(selector, limit).await
            }
            Step::Press { key } => page.press(key).await,
        }
    }
}

/// Replays `steps` in order, stopping at the first failure.
/// Each step is cut off once `timeout` passes on top of any wait it asks for.
pub async fn run_steps(page: &dyn Page, steps: &[Step], timeout: Duration) -> BrowserResult<()> {
    for (i, step) in steps.iter().enumerate() {
        debug!("Step {}/{}: {}", i + 1, steps.len(), step);
        let budget = step.budget(timeout);
        tokio::time::timeout(budget, step.run(page, timeout))
            .await
            .map_err(|_| BrowserError::Timeout(budget))??;
    }
    Ok(())
}
