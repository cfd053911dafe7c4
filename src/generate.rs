//! Seam to the generative model that rebuilds a page from its captured context.
//!
//! The model itself is opaque: anything implementing [`MarkupGenerator`] can
//! turn a [`GenerationRequest`] into markup. This module owns what surrounds
//! it: prompt assembly, retrying rate-limited calls, and tidying the reply.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::clean::CleaningPolicy;
use crate::pipeline::PageContext;
use crate::{GrabError, Result};

pub const ENV_MOCK_HTML: &str = "SITEGRAB_MOCK_HTML";
pub const ENV_MOCK_HTML_PATH: &str = "SITEGRAB_MOCK_HTML_PATH";
pub const ENV_GENERATOR_CMD: &str = "SITEGRAB_GENERATOR_CMD";
pub const ENV_GENERATOR_ARGS: &str = "SITEGRAB_GENERATOR_ARGS";
pub const ENV_GENERATOR_URL: &str = "SITEGRAB_GENERATOR_URL";
pub const ENV_GENERATOR_API_KEY: &str = "SITEGRAB_GENERATOR_API_KEY";

/// Exit status a generator command uses to report a rate limit (`EX_TEMPFAIL`).
pub const RATE_LIMIT_EXIT_CODE: i32 = 75;

/// Builds a system prompt around the policy-specific description of the markup.
macro_rules! system_prompt {
    ($markup_note:literal) => {
        concat!(
            r#"You are an expert web developer who builds faithful HTML and CSS replicas of existing websites.
Produce one self-contained HTML file, with all CSS in a single <style> block inside <head>, that reproduces the design shown as closely as possible.

You receive:
1. A full-page desktop screenshot (1920px wide viewport).
2. A full-page mobile screenshot (390px wide viewport).
3. "#,
            $markup_note,
            r#"

Guidelines:
- Read layout, typography (families, sizes, weights, colours), spacing, borders and shadows from both screenshots.
- Recreate the elements present in the cleaned HTML and keep their semantic tags.
- Use media queries (for example @media (max-width: 768px)) so the page moves between the desktop and mobile appearance.
- Where an empty element clearly held an icon, use a simple inline SVG or a Unicode character, or leave a short HTML comment placeholder.
- Emit a well-formed document: <!DOCTYPE html>, <html>, <head> with <meta charset="UTF-8">, a viewport meta tag and <title>Website Clone</title>, and <body>.
- Do not use external stylesheets, fonts services or JavaScript.
- Prefer web-safe font stacks that approximate the screenshots; name a specific font only when it is obvious.
- Images visible in the screenshots but missing from the HTML may be added as CSS backgrounds with descriptive placeholder URLs.
- Reply with the HTML only, starting with <!DOCTYPE html>, without any explanation around it."#
        )
    };
}

/// Prompt used when the markup was cleaned with [`CleaningPolicy::Structure`].
pub const STRUCTURE_SYSTEM_PROMPT: &str = system_prompt!(
    "The cleaned HTML structure of the page body. Classes, inline styles, scripts and data attributes were removed; rely on the semantic tags for structure and on the screenshots for styling."
);

/// Prompt used when the markup was cleaned with [`CleaningPolicy::Fidelity`].
pub const FIDELITY_SYSTEM_PROMPT: &str = system_prompt!(
    "The cleaned HTML of the page body. Scripts and data attributes were removed, but class and style attributes, inline SVG and any captured stylesheets were kept; use them as styling hints together with the screenshots."
);

/// Built-in prompt matching how the markup was cleaned.
pub fn default_system_prompt(policy: CleaningPolicy) -> &'static str {
    match policy {
        CleaningPolicy::Structure => STRUCTURE_SYSTEM_PROMPT,
        CleaningPolicy::Fidelity => FIDELITY_SYSTEM_PROMPT,
    }
}

/// Everything the model gets for one page.
#[derive(Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub cleaned_markup: String,
    pub desktop_png: Vec<u8>,
    pub mobile_png: Vec<u8>,
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("system_prompt", &self.system_prompt.len())
            .field("cleaned_markup", &self.cleaned_markup.len())
            .field("desktop_png", &self.desktop_png.len())
            .field("mobile_png", &self.mobile_png.len())
            .finish()
    }
}

impl GenerationRequest {
    pub fn from_context(context: &PageContext, system_prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            cleaned_markup: context.cleaned_markup.clone(),
            desktop_png: context.desktop_image.clone(),
            mobile_png: context.mobile_image.clone(),
        }
    }

    /// Text part of the prompt. The screenshots travel alongside it, in the
    /// order the labels announce them.
    pub fn prompt_text(&self) -> String {
        format!(
            "{}\n\nHere is the design context:\n\nCleaned HTML Structure:\n```html\n{}\n```\n\nDesktop Screenshot (PNG, attached first).\n\nMobile Screenshot (PNG, attached second).\n\nPlease generate the complete HTML code as a single block, starting with <!DOCTYPE html>.",
            self.system_prompt.trim(),
            self.cleaned_markup
        )
    }

    pub fn desktop_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.desktop_png)
    }

    pub fn mobile_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.mobile_png)
    }

    fn wire_payload(&self) -> WirePayload {
        WirePayload {
            system_prompt: self.system_prompt.clone(),
            prompt: self.prompt_text(),
            cleaned_html: self.cleaned_markup.clone(),
            desktop_screenshot_base64: self.desktop_base64(),
            mobile_screenshot_base64: self.mobile_base64(),
        }
    }
}

/// JSON body sent to command and HTTP backends.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    system_prompt: String,
    prompt: String,
    cleaned_html: String,
    desktop_screenshot_base64: String,
    mobile_screenshot_base64: String,
}

/// The generative model: captured context in, page markup out.
///
/// Implementations report quota and throttling failures as
/// [`GrabError::RateLimited`] so [`generate_with_retry`] can back off.
#[async_trait]
pub trait MarkupGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Backoff for rate-limited generation calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Generation settings (`[generate]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GenerateOptions {
    pub retry: RetryPolicy,
    /// Overrides the built-in prompt for every cleaning policy.
    pub system_prompt: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            system_prompt: None,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl GenerateOptions {
    /// The configured prompt, else the built-in one for `policy`.
    pub fn system_prompt(&self, policy: CleaningPolicy) -> &str {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| default_system_prompt(policy))
    }
}

/// Calls the generator, retrying rate limits with exponential backoff.
///
/// Any other error is returned immediately. The reply has Markdown code
/// fences removed.
pub async fn generate_with_retry(
    generator: &dyn MarkupGenerator,
    request: &GenerationRequest,
    policy: &RetryPolicy,
) -> Result<String> {
    let mut attempt = 0;
    loop {
        info!(generator = generator.name(), attempt = attempt + 1, "requesting markup");
        match generator.generate(request).await {
            Ok(raw) => {
                let html = strip_code_fences(&raw);
                if html.is_empty() {
                    warn!(generator = generator.name(), "generator returned empty markup");
                }
                debug!(bytes = html.len(), "generation finished");
                return Ok(html);
            }
            Err(GrabError::RateLimited(message)) => {
                if attempt >= policy.max_retries {
                    warn!(attempts = attempt + 1, "generation still rate limited; giving up");
                    return Err(GrabError::RateLimited(format!(
                        "still rate limited after {} attempt(s): {message}",
                        attempt + 1
                    )));
                }
                let delay = policy.delay_for(attempt);
                warn!(?delay, error = %message, "generation rate limited; backing off");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

/// Removes a leading ```` ```html ```` (or bare ```` ``` ````) fence and a trailing fence.
pub fn strip_code_fences(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest
            .strip_prefix("html")
            .or_else(|| rest.strip_prefix("HTML"))
            .unwrap_or(rest);
        body = rest.trim();
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest.trim();
    }
    body.to_string()
}

/// Returns fixed markup; used for offline runs and tests.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    html: String,
}

impl MockGenerator {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[async_trait]
impl MarkupGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Ok(self.html.clone())
    }
}

/// Runs an external program with the request as JSON on stdin and reads the
/// markup from stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

fn looks_rate_limited(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    ["rate limit", "resource exhausted", "resourceexhausted", "quota", "429"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[async_trait]
impl MarkupGenerator for CommandGenerator {
    fn name(&self) -> &str {
        &self.program
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let payload = serde_json::to_vec(&request.wire_payload())?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GrabError::Config(format!(
                    "Failed to run generator command '{}': {e}",
                    self.program
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                GrabError::Generation(format!(
                    "Generator command '{}' timed out after {:?}",
                    self.program, self.timeout
                ))
            })??;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let message = format!(
                "Generator command exited with {}: {}",
                output.status, stderr
            );
            if output.status.code() == Some(RATE_LIMIT_EXIT_CODE) || looks_rate_limited(&stderr) {
                return Err(GrabError::RateLimited(message));
            }
            return Err(GrabError::Generation(message));
        }
        if !stderr.is_empty() {
            debug!(stderr = %stderr, "generator command stderr");
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(GrabError::Generation(
                "Generator command produced no output".to_string(),
            ));
        }
        Ok(stdout)
    }
}

/// POSTs the request as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HttpGeneratorResponse {
    html: Option<String>,
    code: Option<String>,
    output: Option<String>,
    result: Option<String>,
}

impl HttpGenerator {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl MarkupGenerator for HttpGenerator {
    fn name(&self) -> &str {
        &self.url
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut call = self.client.post(&self.url).json(&request.wire_payload());
        if let Some(token) = self.api_key.as_deref().filter(|t| !t.trim().is_empty()) {
            call = call.bearer_auth(token);
        }

        let response = call.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GrabError::RateLimited(format!(
                "Generator HTTP {status}: {}",
                text.trim()
            )));
        }
        if !status.is_success() {
            return Err(GrabError::Generation(format!(
                "Generator HTTP {status}: {}",
                text.trim()
            )));
        }

        if let Ok(json) = serde_json::from_str::<HttpGeneratorResponse>(&text) {
            if let Some(html) = json.html.or(json.code).or(json.output).or(json.result) {
                return Ok(html);
            }
        }
        if text.trim().is_empty() {
            return Err(GrabError::Generation(
                "Generator HTTP response was empty".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Picks a backend from the environment:
/// `SITEGRAB_MOCK_HTML` / `SITEGRAB_MOCK_HTML_PATH`, then `SITEGRAB_GENERATOR_CMD`,
/// then `SITEGRAB_GENERATOR_URL`.
pub fn generator_from_env(options: &GenerateOptions) -> Result<Arc<dyn MarkupGenerator>> {
    generator_from_lookup(options, |key| std::env::var(key).ok())
}

pub(crate) fn generator_from_lookup(
    options: &GenerateOptions,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn MarkupGenerator>> {
    let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(html) = var(ENV_MOCK_HTML) {
        return Ok(Arc::new(MockGenerator::new(html)));
    }
    if let Some(path) = var(ENV_MOCK_HTML_PATH) {
        let html = std::fs::read_to_string(&path).map_err(|e| {
            GrabError::Config(format!("Failed to read mock HTML file {path}: {e}"))
        })?;
        return Ok(Arc::new(MockGenerator::new(html)));
    }
    if let Some(program) = var(ENV_GENERATOR_CMD) {
        let args = var(ENV_GENERATOR_ARGS)
            .map(|args| args.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        return Ok(Arc::new(CommandGenerator::new(
            program,
            args,
            options.request_timeout,
        )));
    }
    if let Some(url) = var(ENV_GENERATOR_URL) {
        return Ok(Arc::new(HttpGenerator::new(
            url,
            var(ENV_GENERATOR_API_KEY),
            options.request_timeout,
        )?));
    }
    Err(GrabError::Config(format!(
        "No generator backend configured; set {ENV_GENERATOR_URL}, {ENV_GENERATOR_CMD}, or {ENV_MOCK_HTML}."
    )))
}
