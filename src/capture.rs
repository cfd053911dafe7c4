//! Page capture: dual-viewport screenshots plus the rendered markup.
//!
//! Each attempt runs in its own browser session which is released before the
//! attempt returns, whatever the outcome. Failed attempts are retried with a
//! linear backoff until the attempt budget is spent.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::browser::{
    BrowserDriver, BrowserSession, ContentScope, SessionOptions, WaitUntil, STEALTH_INIT_SCRIPT,
};
use crate::{GrabError, Result, Viewport};

/// Attempts used when the caller does not ask for a specific number.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0)";
const SCROLL_TO_TOP: &str = "window.scrollTo(0, 0)";

/// Heuristics for pages that loaded but are not the real site (bot walls,
/// browser error pages, empty shells).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DegenerateCheck {
    pub enabled: bool,
    /// Minimum number of characters in the trimmed markup.
    pub min_markup_len: usize,
    /// Case-insensitive substrings that mark an error or challenge page. They
    /// are matched against the `<title>`, and against the visible text only
    /// when that text is shorter than `marker_text_limit`.
    pub error_markers: Vec<String>,
    pub marker_text_limit: usize,
}

impl Default for DegenerateCheck {
    fn default() -> Self {
        Self {
            enabled: true,
            min_markup_len: 200,
            error_markers: [
                "access denied",
                "403 forbidden",
                "attention required! | cloudflare",
                "checking your browser before accessing",
                "err_name_not_resolved",
                "this site can’t be reached",
                "this site can't be reached",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            marker_text_limit: 512,
        }
    }
}

impl DegenerateCheck {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Returns the reason the markup looks implausible, if it does.
    pub fn inspect(&self, markup: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let trimmed = markup.trim();
        let len = trimmed.chars().count();
        if len < self.min_markup_len {
            return Some(format!(
                "markup has {len} characters, expected at least {}",
                self.min_markup_len
            ));
        }
        let page = PageText::extract(trimmed);
        let short = page.visible_chars < self.marker_text_limit;
        self.error_markers
            .iter()
            .map(|marker| marker.to_lowercase())
            .filter(|marker| !marker.is_empty())
            .find_map(|marker| {
                if page.title.contains(&marker) {
                    Some(format!("page title contains error-page marker \"{marker}\""))
                } else if short && page.text.contains(&marker) {
                    Some(format!(
                        "short page ({} visible characters) contains error-page marker \"{marker}\"",
                        page.visible_chars
                    ))
                } else {
                    None
                }
            })
    }
}

/// Lowercased title and visible text of a page.
struct PageText {
    title: String,
    text: String,
    visible_chars: usize,
}

impl PageText {
    fn extract(markup: &str) -> Self {
        let html = scraper::Html::parse_document(markup);
        let mut title = String::new();
        let mut text = String::new();
        for node in html.root_element().descendants() {
            let Some(chunk) = node.value().as_text() else {
                continue;
            };
            let parent = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|el| el.name()));
            match parent {
                Some("script" | "style" | "noscript" | "template") => {}
                Some("title") => title.push_str(chunk),
                _ => {
                    text.push_str(chunk);
                    text.push(' ');
                }
            }
        }
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            title: title.to_lowercase(),
            visible_chars: text.chars().count(),
            text: text.to_lowercase(),
        }
    }
}

/// Tunables for [`PageCapture`]. Durations are written as `"60s"`, `"1500ms"` in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CaptureOptions {
    pub max_attempts: u32,
    pub session: SessionOptions,
    /// Inject the automation-masking init script before navigating.
    pub stealth: bool,
    pub wait_until: WaitUntil,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    /// Pause after navigation for client-side rendering to finish.
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Scroll to the bottom and back to trigger lazy-loaded content.
    pub scroll_cycle: bool,
    #[serde(with = "humantime_serde")]
    pub scroll_pause: Duration,
    pub desktop_viewport: Viewport,
    pub mobile_viewport: Viewport,
    /// Pause after a viewport change so the layout can reflow.
    #[serde(with = "humantime_serde")]
    pub reflow_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub screenshot_timeout: Duration,
    pub content_scope: ContentScope,
    #[serde(with = "humantime_serde")]
    pub content_timeout: Duration,
    /// Bound for small steps: init script, viewport changes, scroll evaluation.
    #[serde(with = "humantime_serde")]
    pub step_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_step: Duration,
    pub degenerate: DegenerateCheck,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            session: SessionOptions::default(),
            stealth: true,
            wait_until: WaitUntil::DomContentLoaded,
            navigation_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(5),
            scroll_cycle: true,
            scroll_pause: Duration::from_secs(1),
            desktop_viewport: Viewport::DESKTOP,
            mobile_viewport: Viewport::MOBILE,
            reflow_delay: Duration::from_millis(1500),
            screenshot_timeout: Duration::from_secs(30),
            content_scope: ContentScope::Body,
            content_timeout: Duration::from_secs(20),
            step_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(3),
            backoff_step: Duration::from_secs(2),
            degenerate: DegenerateCheck::default(),
        }
    }
}

impl CaptureOptions {
    /// Delay before the retry that follows the zero-based `failed_attempt`.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        self.backoff_base + self.backoff_step * failed_attempt
    }

    /// Same timing as production but without any waiting; used for tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.settle_delay = Duration::ZERO;
        self.scroll_pause = Duration::ZERO;
        self.reflow_delay = Duration::ZERO;
        self.backoff_base = Duration::ZERO;
        self.backoff_step = Duration::ZERO;
        self
    }
}

/// Screenshots and markup from one successful attempt.
#[derive(Clone)]
pub struct CapturedContext {
    url: String,
    desktop_image: Vec<u8>,
    mobile_image: Vec<u8>,
    raw_markup: Option<String>,
    markup_error: Option<String>,
    attempts: u32,
    elapsed: Duration,
}

impl fmt::Debug for CapturedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedContext")
            .field("url", &self.url)
            .field("desktop_image", &format_args!("{} bytes", self.desktop_image.len()))
            .field("mobile_image", &format_args!("{} bytes", self.mobile_image.len()))
            .field("raw_markup", &self.raw_markup.as_ref().map(String::len))
            .field("markup_error", &self.markup_error)
            .field("attempts", &self.attempts)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

impl CapturedContext {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// PNG bytes of the full desktop page.
    pub fn desktop_image(&self) -> &[u8] {
        &self.desktop_image
    }

    /// PNG bytes of the full mobile page.
    pub fn mobile_image(&self) -> &[u8] {
        &self.mobile_image
    }

    pub fn raw_markup(&self) -> Option<&str> {
        self.raw_markup.as_deref()
    }

    /// Why markup is missing, when it is.
    pub fn markup_error(&self) -> Option<&str> {
        self.markup_error.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn desktop_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.desktop_image)
    }

    pub fn mobile_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.mobile_image)
    }

    /// The raw markup, or a comment explaining why there is none.
    pub fn markup_or_placeholder(&self) -> String {
        match &self.raw_markup {
            Some(markup) => markup.clone(),
            None => extraction_failed_placeholder(self.markup_error.as_deref()),
        }
    }

    /// Splits into `(desktop_image, mobile_image, raw_markup, markup_error)`.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>, Option<String>, Option<String>) {
        (
            self.desktop_image,
            self.mobile_image,
            self.raw_markup,
            self.markup_error,
        )
    }
}

pub(crate) fn extraction_failed_placeholder(reason: Option<&str>) -> String {
    format!(
        "<!-- HTML extraction failed: {} -->",
        reason.unwrap_or("unknown error").replace("--", "- -")
    )
}

/// Output of a single attempt before bookkeeping is attached.
struct AttemptOutput {
    desktop_image: Vec<u8>,
    mobile_image: Vec<u8>,
    raw_markup: Option<String>,
    markup_error: Option<String>,
}

/// Owns a session for the duration of one attempt.
///
/// `release` closes it explicitly; a guard dropped without release (cancelled
/// future, panic) drops the session, which kills its browser process.
struct SessionGuard {
    session: Box<dyn BrowserSession>,
    released: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    fn session(&mut self) -> &mut dyn BrowserSession {
        self.session.as_mut()
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.session.close().await {
            warn!(error = %err, "failed to close browser session cleanly");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!("browser session dropped before release; killing browser");
        }
    }
}

/// Captures screenshots and markup of a URL through a [`BrowserDriver`].
#[derive(Clone)]
pub struct PageCapture {
    driver: Arc<dyn BrowserDriver>,
    options: CaptureOptions,
}

impl fmt::Debug for PageCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCapture")
            .field("driver", &self.driver.name())
            .field("options", &self.options)
            .finish()
    }
}

impl PageCapture {
    pub fn new(driver: Arc<dyn BrowserDriver>, options: CaptureOptions) -> Self {
        Self { driver, options }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Captures with the configured attempt budget.
    pub async fn capture(&self, url: &str) -> Result<CapturedContext> {
        self.capture_context(url, self.options.max_attempts).await
    }

    /// Runs up to `max_attempts` (at least one) isolated attempts against `url`.
    pub async fn capture_context(&self, url: &str, max_attempts: u32) -> Result<CapturedContext> {
        let parsed = url::Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GrabError::Config(format!(
                "Unsupported URL scheme '{}'; expected http or https",
                parsed.scheme()
            )));
        }

        let max_attempts = max_attempts.max(1);
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            info!(
                url,
                attempt = attempt + 1,
                max_attempts,
                driver = self.driver.name(),
                "starting capture attempt"
            );
            match self.run_attempt(url).await {
                Ok(output) => {
                    let elapsed = started.elapsed();
                    info!(url, attempt = attempt + 1, ?elapsed, "capture succeeded");
                    return Ok(CapturedContext {
                        url: url.to_string(),
                        desktop_image: output.desktop_image,
                        mobile_image: output.mobile_image,
                        raw_markup: output.raw_markup,
                        markup_error: output.markup_error,
                        attempts: attempt + 1,
                        elapsed,
                    });
                }
                Err(err) => {
                    warn!(url, attempt = attempt + 1, error = %err, "capture attempt failed");
                    last_error = Some(err);
                    if attempt + 1 < max_attempts {
                        let delay = self.options.backoff_delay(attempt);
                        info!(url, ?delay, "retrying capture after backoff");
                        pause(delay).await;
                    }
                }
            }
        }

        Err(GrabError::CaptureExhausted {
            url: url.to_string(),
            attempts: max_attempts,
            source: Box::new(
                last_error.unwrap_or_else(|| GrabError::Unknown("no capture attempt ran".into())),
            ),
        })
    }

    async fn run_attempt(&self, url: &str) -> Result<AttemptOutput> {
        let session = self.driver.open_session(&self.options.session).await?;
        let mut guard = SessionGuard::new(session);
        let outcome = self.drive(guard.session(), url).await;
        guard.release().await;
        outcome
    }

    async fn drive(&self, session: &mut dyn BrowserSession, url: &str) -> Result<AttemptOutput> {
        let opts = &self.options;

        if opts.stealth {
            session
                .add_init_script(STEALTH_INIT_SCRIPT, opts.step_timeout)
                .await?;
        }

        info!(url, wait_until = ?opts.wait_until, "navigating");
        session
            .navigate(url, opts.wait_until, opts.navigation_timeout)
            .await?;

        debug!(delay = ?opts.settle_delay, "waiting for the page to settle");
        pause(opts.settle_delay).await;

        if opts.scroll_cycle {
            self.scroll_cycle(session).await;
        }

        let desktop_image = self
            .screenshot_at(session, opts.desktop_viewport, "desktop screenshot")
            .await?;
        let mobile_image = self
            .screenshot_at(session, opts.mobile_viewport, "mobile screenshot")
            .await?;

        info!(url, scope = ?opts.content_scope, "extracting markup");
        let (raw_markup, markup_error) = match session
            .content(opts.content_scope, opts.content_timeout)
            .await
        {
            Ok(markup) => {
                if let Some(reason) = opts.degenerate.inspect(&markup) {
                    return Err(GrabError::DegenerateContent(reason));
                }
                (Some(markup), None)
            }
            Err(err) => {
                warn!(url, error = %err, "markup extraction failed; continuing with screenshots only");
                (None, Some(err.to_string()))
            }
        };

        Ok(AttemptOutput {
            desktop_image,
            mobile_image,
            raw_markup,
            markup_error,
        })
    }

    async fn scroll_cycle(&self, session: &mut dyn BrowserSession) {
        let opts = &self.options;
        for expression in [SCROLL_TO_BOTTOM, SCROLL_TO_TOP] {
            if let Err(err) = session.evaluate(expression, opts.step_timeout).await {
                warn!(error = %err, "scroll cycle failed; continuing");
                return;
            }
            pause(opts.scroll_pause).await;
        }
    }

    async fn screenshot_at(
        &self,
        session: &mut dyn BrowserSession,
        viewport: Viewport,
        step: &str,
    ) -> Result<Vec<u8>> {
        let opts = &self.options;
        session.set_viewport(viewport, opts.step_timeout).await?;
        pause(opts.reflow_delay).await;
        info!(%viewport, "taking {step}");
        let bytes = session.screenshot(true, opts.screenshot_timeout).await?;
        let (width, height) = image_dimensions(&bytes).map_err(|err| {
            GrabError::render_timeout(
                format!("{step} (invalid image data: {err})"),
                opts.screenshot_timeout,
            )
        })?;
        debug!(width, height, bytes = bytes.len(), "{step} captured");
        Ok(bytes)
    }
}

fn image_dimensions(bytes: &[u8]) -> std::result::Result<(u32, u32), image::ImageError> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageOutputFormat, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([200, 10, 10, 255]),
        ));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png)
            .expect("encode png");
        buf.into_inner()
    }

    fn long_markup() -> String {
        format!("<main><h1>Welcome</h1>{}</main>", "<p>content</p>".repeat(30))
    }

    #[derive(Clone)]
    enum Markup {
        Ok(String),
        Fails,
    }

    struct ScriptedDriver {
        markup: Markup,
        screenshot: Vec<u8>,
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        viewports: Arc<std::sync::Mutex<Vec<Viewport>>>,
    }

    impl ScriptedDriver {
        fn new(markup: Markup) -> Self {
            Self {
                markup,
                screenshot: png(8, 6),
                opened: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicUsize::new(0)),
                viewports: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    struct ScriptedSession {
        markup: Markup,
        screenshot: Vec<u8>,
        closed: Arc<AtomicUsize>,
        viewports: Arc<std::sync::Mutex<Vec<Viewport>>>,
    }

    #[async_trait]
    impl BrowserDriver for ScriptedDriver {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn open_session(&self, _: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                markup: self.markup.clone(),
                screenshot: self.screenshot.clone(),
                closed: self.closed.clone(),
                viewports: self.viewports.clone(),
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for ScriptedSession {
        async fn add_init_script(&mut self, _: &str, _: Duration) -> Result<()> {
            Ok(())
        }

        async fn navigate(&mut self, _: &str, _: WaitUntil, _: Duration) -> Result<()> {
            Ok(())
        }

        async fn set_viewport(&mut self, viewport: Viewport, _: Duration) -> Result<()> {
            self.viewports.lock().unwrap().push(viewport);
            Ok(())
        }

        async fn screenshot(&mut self, _: bool, _: Duration) -> Result<Vec<u8>> {
            Ok(self.screenshot.clone())
        }

        async fn content(&mut self, _: ContentScope, timeout: Duration) -> Result<String> {
            match &self.markup {
                Markup::Ok(markup) => Ok(markup.clone()),
                Markup::Fails => Err(GrabError::render_timeout("content extraction", timeout)),
            }
        }

        async fn evaluate(&mut self, _: &str, _: Duration) -> Result<serde_json::Value> {
            Err(GrabError::session("evaluate not supported"))
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn capture_with(driver: ScriptedDriver) -> PageCapture {
        PageCapture::new(Arc::new(driver), CaptureOptions::default().without_delays())
    }

    #[test]
    fn backoff_grows_linearly_from_base() {
        let opts = CaptureOptions::default();
        assert_eq!(opts.backoff_delay(0), Duration::from_secs(3));
        assert_eq!(opts.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(opts.backoff_delay(2), Duration::from_secs(7));
    }

    #[test]
    fn default_options_use_desktop_and_mobile_viewports() {
        let opts = CaptureOptions::default();
        assert_eq!(opts.desktop_viewport, Viewport::DESKTOP);
        assert_eq!(opts.mobile_viewport, Viewport::MOBILE);
        assert_eq!(opts.navigation_timeout, Duration::from_secs(60));
        assert_eq!(opts.max_attempts, 2);
        assert_eq!(opts.wait_until, WaitUntil::DomContentLoaded);
    }

    #[test]
    fn degenerate_check_flags_short_markup() {
        let check = DegenerateCheck::default();
        let reason = check.inspect("  <p>hi</p>  ").expect("short markup is degenerate");
        assert!(reason.contains("expected at least 200"));
        assert!(check.inspect("").is_some());
    }

    #[test]
    fn degenerate_check_flags_error_markers_case_insensitively() {
        let check = DegenerateCheck::default();
        let markup = format!("<h1>ACCESS DENIED</h1>{}", "<p>x</p>".repeat(40));
        let reason = check.inspect(&markup).expect("marker should match");
        assert!(reason.contains("access denied"));
    }

    #[test]
    fn long_article_mentioning_a_marker_is_not_degenerate() {
        let check = DegenerateCheck::default();
        let markup = format!(
            "<article><h1>HTTP 403 Forbidden explained</h1>{}</article>",
            "<p>When a server says access denied it means the request was understood.</p>"
                .repeat(20)
        );
        assert!(check.inspect(&markup).is_none());
    }

    #[test]
    fn challenge_title_is_degenerate_regardless_of_length() {
        let check = DegenerateCheck::default();
        let markup = format!(
            "<html><head><title>Attention Required! | Cloudflare</title></head><body>{}</body></html>",
            "<p>Please enable cookies to continue browsing this site.</p>".repeat(20)
        );
        let reason = check.inspect(&markup).expect("title marker should match");
        assert!(reason.contains("page title"), "{reason}");
    }

    #[test]
    fn degenerate_check_accepts_ordinary_pages_and_can_be_disabled() {
        let check = DegenerateCheck::default();
        assert!(check.inspect(&long_markup()).is_none());
        assert!(DegenerateCheck::disabled().inspect("").is_none());
    }

    #[test]
    fn options_deserialize_humantime_durations() {
        let opts: CaptureOptions = toml::from_str(
            r#"
max-attempts = 4
navigation-timeout = "15s"
reflow-delay = "250ms"
content-scope = "document"
"#,
        )
        .expect("parse capture options");
        assert_eq!(opts.max_attempts, 4);
        assert_eq!(opts.navigation_timeout, Duration::from_secs(15));
        assert_eq!(opts.reflow_delay, Duration::from_millis(250));
        assert_eq!(opts.content_scope, ContentScope::Document);
        assert_eq!(opts.screenshot_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn capture_returns_both_screenshots_and_markup() {
        let driver = ScriptedDriver::new(Markup::Ok(long_markup()));
        let viewports = driver.viewports.clone();
        let capture = capture_with(driver);

        let ctx = capture
            .capture_context("https://example.com", 2)
            .await
            .expect("capture succeeds");

        assert_eq!(ctx.attempts(), 1);
        assert_eq!(ctx.url(), "https://example.com");
        assert!(!ctx.desktop_image().is_empty());
        assert!(!ctx.mobile_image().is_empty());
        assert_eq!(ctx.raw_markup(), Some(long_markup().as_str()));
        assert!(ctx.markup_error().is_none());
        assert_eq!(
            *viewports.lock().unwrap(),
            vec![Viewport::DESKTOP, Viewport::MOBILE]
        );
        assert_eq!(
            BASE64_STANDARD.decode(ctx.desktop_base64()).unwrap(),
            ctx.desktop_image()
        );
    }

    #[tokio::test]
    async fn failed_extraction_degrades_to_missing_markup() {
        let driver = ScriptedDriver::new(Markup::Fails);
        let closed = driver.closed.clone();
        let capture = capture_with(driver);

        let ctx = capture
            .capture_context("https://example.com", 2)
            .await
            .expect("screenshots alone are a success");

        assert_eq!(ctx.attempts(), 1);
        assert!(ctx.raw_markup().is_none());
        assert!(ctx.markup_error().unwrap_or_default().contains("content extraction"));
        assert!(ctx
            .markup_or_placeholder()
            .starts_with("<!-- HTML extraction failed:"));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn degenerate_markup_exhausts_attempts() {
        let driver = ScriptedDriver::new(Markup::Ok("<p>Just a moment...</p>".into()));
        let opened = driver.opened.clone();
        let closed = driver.closed.clone();
        let capture = capture_with(driver);

        let err = capture
            .capture_context("https://example.com", 3)
            .await
            .expect_err("degenerate content fails every attempt");

        match err {
            GrabError::CaptureExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, GrabError::DegenerateContent(_)));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(opened.load(Ordering::SeqCst), 3);
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalid_screenshot_bytes_fail_the_attempt() {
        let mut driver = ScriptedDriver::new(Markup::Ok(long_markup()));
        driver.screenshot = b"not a png".to_vec();
        let capture = capture_with(driver);

        let err = capture
            .capture_context("https://example.com", 1)
            .await
            .expect_err("garbage screenshot must fail");
        let GrabError::CaptureExhausted { source, .. } = err else {
            panic!("expected exhaustion");
        };
        match *source {
            GrabError::RenderTimeout { step, .. } => {
                assert!(step.contains("desktop screenshot"));
                assert!(step.contains("invalid image data"));
            }
            other => panic!("expected render timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let driver = ScriptedDriver::new(Markup::Ok(long_markup()));
        let opened = driver.opened.clone();
        let capture = capture_with(driver);

        let ctx = capture
            .capture_context("https://example.com", 0)
            .await
            .expect("clamped to one attempt");
        assert_eq!(ctx.attempts(), 1);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_http_urls_are_rejected_before_launching() {
        let driver = ScriptedDriver::new(Markup::Ok(long_markup()));
        let opened = driver.opened.clone();
        let capture = capture_with(driver);

        let err = capture
            .capture_context("file:///etc/passwd", 2)
            .await
            .expect_err("file urls are not captured");
        assert!(matches!(err, GrabError::Config(_)));
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }
}
