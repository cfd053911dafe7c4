//! Chrome DevTools Protocol driver built on `chromiumoxide`.
//!
//! Talks to a locally installed Chrome/Chromium directly instead of going
//! through Node.js. Enabled with the `cdp` feature.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, SetBypassCspParams,
};
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout as with_timeout;
use tracing::{debug, warn};

use super::{BrowserDriver, BrowserSession, ContentScope, SessionOptions, WaitUntil};
use crate::{GrabError, Result, Viewport};

const BODY_MARKUP_EXPRESSION: &str = "document.body ? document.body.innerHTML : ''";

/// Launches a dedicated Chromium per session over CDP.
#[derive(Debug, Clone, Default)]
pub struct CdpDriver {
    chrome_executable: Option<std::path::PathBuf>,
    launch_timeout: Option<Duration>,
}

impl CdpDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    pub fn with_launch_timeout(mut self, launch_timeout: Duration) -> Self {
        self.launch_timeout = Some(launch_timeout);
        self
    }
}

fn cdp_error(step: &str, err: impl std::fmt::Display) -> GrabError {
    GrabError::session(format!("{step} failed: {err}"))
}

fn cdp_viewport(viewport: Viewport) -> CdpViewport {
    CdpViewport {
        width: viewport.width,
        height: viewport.height,
        device_scale_factor: Some(1.0),
        emulating_mobile: false,
        is_landscape: viewport.width >= viewport.height,
        has_touch: false,
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    fn name(&self) -> &'static str {
        "cdp"
    }

    async fn open_session(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        let mut builder = BrowserConfig::builder().viewport(cdp_viewport(options.viewport));
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(launch_timeout) = self.launch_timeout {
            builder = builder.launch_timeout(launch_timeout);
        }
        for arg in &options.launch_args {
            builder = builder.arg(arg);
        }
        builder = builder.arg(format!("--lang={}", options.locale));
        if options.ignore_https_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        let config = builder
            .build()
            .map_err(|e| GrabError::session(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| cdp_error("browser launch", e))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut session = CdpSession {
            browser,
            page: None,
            handler_task: Some(handler_task),
        };
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| cdp_error("new page", e))?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(options.user_agent.clone())
            .accept_language(options.locale.clone())
            .build()
            .map_err(|e| cdp_error("user agent override", e))?;
        page.execute(user_agent)
            .await
            .map_err(|e| cdp_error("user agent override", e))?;

        let headers: serde_json::Map<String, serde_json::Value> = options
            .extra_headers
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect();
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::Value::Object(headers),
        )))
        .await
        .map_err(|e| cdp_error("extra headers", e))?;

        if options.bypass_csp {
            page.execute(SetBypassCspParams::new(true))
                .await
                .map_err(|e| cdp_error("CSP bypass", e))?;
        }

        session.page = Some(page);
        debug!(viewport = %options.viewport, "cdp session ready");
        Ok(Box::new(session))
    }
}

struct CdpSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
}

impl CdpSession {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| GrabError::session("browser session already closed"))
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn add_init_script(&mut self, script: &str, timeout: Duration) -> Result<()> {
        let page = self.page()?;
        with_timeout(
            timeout,
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string())),
        )
        .await
        .map_err(|_| GrabError::render_timeout("init script", timeout))?
        .map_err(|e| cdp_error("init script", e))?;
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<()> {
        let page = self.page()?;
        // `goto` resolves once the frame finished loading, which also covers DOMContentLoaded.
        let _ = wait_until;
        with_timeout(timeout, page.goto(url))
            .await
            .map_err(|_| {
                GrabError::navigation(format!("{url}: timed out after {timeout:?}"))
            })?
            .map_err(|e| GrabError::navigation(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport, timeout: Duration) -> Result<()> {
        let page = self.page()?;
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| cdp_error("set viewport", e))?;
        with_timeout(timeout, page.execute(params))
            .await
            .map_err(|_| GrabError::render_timeout("set viewport", timeout))?
            .map_err(|e| cdp_error("set viewport", e))?;
        Ok(())
    }

    async fn screenshot(&mut self, full_page: bool, timeout: Duration) -> Result<Vec<u8>> {
        let page = self.page()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        with_timeout(timeout, page.screenshot(params))
            .await
            .map_err(|_| GrabError::render_timeout("screenshot", timeout))?
            .map_err(|e| cdp_error("screenshot", e))
    }

    async fn content(&mut self, scope: ContentScope, timeout: Duration) -> Result<String> {
        let page = self.page()?;
        match scope {
            ContentScope::Document => with_timeout(timeout, page.content())
                .await
                .map_err(|_| GrabError::render_timeout("content extraction", timeout))?
                .map_err(|e| cdp_error("content extraction", e)),
            ContentScope::Body => {
                let result = with_timeout(timeout, page.evaluate(BODY_MARKUP_EXPRESSION))
                    .await
                    .map_err(|_| GrabError::render_timeout("content extraction", timeout))?
                    .map_err(|e| cdp_error("content extraction", e))?;
                Ok(result.into_value::<String>().unwrap_or_default())
            }
        }
    }

    async fn evaluate(&mut self, expression: &str, timeout: Duration) -> Result<serde_json::Value> {
        let page = self.page()?;
        let result = with_timeout(timeout, page.evaluate(expression))
            .await
            .map_err(|_| GrabError::render_timeout("evaluate", timeout))?
            .map_err(|e| cdp_error("evaluate", e))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn close(&mut self) -> Result<()> {
        if self.page.take().is_none() {
            return Ok(());
        }
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| cdp_error("browser close", e));
        if let Err(err) = self.browser.wait().await {
            warn!(error = %err, "failed waiting for chromium to exit");
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        result
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}
