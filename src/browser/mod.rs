//! Browser automation capability used by page capture.
//!
//! Capture only talks to the [`BrowserDriver`] / [`BrowserSession`] traits. Each
//! session is an isolated browser (fresh process and context) that is owned by a
//! single capture attempt and closed before the attempt returns.
//!
//! # Module Structure
//!
//! - [`playwright`] - Node.js Playwright helper script, availability checks, error mapping
//! - [`session`] - [`PlaywrightDriver`], one helper process per session over JSON lines
//! - [`stealth`] - Default user agent, headers, launch flags and the anti-detection init script
//! - `cdp` - [`CdpDriver`] on top of `chromiumoxide` (feature `cdp`)
//!
//! # Example
//!
//! ```no_run
//! use sitegrab_lib::{BrowserDriver, ContentScope, PlaywrightDriver, SessionOptions, WaitUntil};
//! use std::time::Duration;
//!
//! # async fn example() -> sitegrab_lib::Result<()> {
//! let driver = PlaywrightDriver::default();
//! let mut session = driver.open_session(&SessionOptions::default()).await?;
//! session
//!     .navigate("https://example.com", WaitUntil::DomContentLoaded, Duration::from_secs(30))
//!     .await?;
//! let body = session.content(ContentScope::Body, Duration::from_secs(10)).await?;
//! session.close().await?;
//! println!("{} bytes of markup", body.len());
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "cdp")]
mod cdp;
mod playwright;
mod session;
mod stealth;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, Viewport};

#[cfg(feature = "cdp")]
pub use cdp::CdpDriver;
pub use session::{PlaywrightDriver, DEFAULT_LAUNCH_TIMEOUT};
pub use stealth::{
    default_extra_headers, DEFAULT_LAUNCH_ARGS, DEFAULT_LOCALE, DEFAULT_USER_AGENT,
    STEALTH_INIT_SCRIPT,
};

/// Lifecycle event that marks a navigation as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitUntil {
    /// The DOM has been parsed (`DOMContentLoaded`).
    #[default]
    DomContentLoaded,
    /// The `load` event fired.
    Load,
}

impl WaitUntil {
    pub fn as_playwright(&self) -> &'static str {
        match self {
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
        }
    }
}

/// Which part of the rendered DOM to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentScope {
    /// `document.body.innerHTML`
    #[default]
    Body,
    /// The full document including `<head>`.
    Document,
}

/// Launch and context settings for one isolated browsing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionOptions {
    pub headless: bool,
    pub user_agent: String,
    pub viewport: Viewport,
    pub locale: String,
    pub extra_headers: Vec<(String, String)>,
    pub ignore_https_errors: bool,
    pub bypass_csp: bool,
    pub launch_args: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport::DESKTOP,
            locale: DEFAULT_LOCALE.to_string(),
            extra_headers: default_extra_headers(),
            ignore_https_errors: true,
            bypass_csp: true,
            launch_args: DEFAULT_LAUNCH_ARGS.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Starts isolated browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Launches a fresh browser and creates a single page in a new context.
    async fn open_session(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>>;
}

/// A single page in an isolated browser. Every call is bounded by its timeout.
///
/// `close` must be safe to call more than once; implementations also release
/// their browser when dropped without being closed.
#[async_trait]
pub trait BrowserSession: Send {
    async fn add_init_script(&mut self, script: &str, timeout: Duration) -> Result<()>;

    async fn navigate(&mut self, url: &str, wait_until: WaitUntil, timeout: Duration)
        -> Result<()>;

    async fn set_viewport(&mut self, viewport: Viewport, timeout: Duration) -> Result<()>;

    /// PNG bytes of the page.
    async fn screenshot(&mut self, full_page: bool, timeout: Duration) -> Result<Vec<u8>>;

    async fn content(&mut self, scope: ContentScope, timeout: Duration) -> Result<String>;

    async fn evaluate(&mut self, expression: &str, timeout: Duration)
        -> Result<serde_json::Value>;

    async fn close(&mut self) -> Result<()>;
}
