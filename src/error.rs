use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum GrabError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Render step '{step}' exceeded {timeout:?}")]
    RenderTimeout { step: String, timeout: Duration },

    #[error("Degenerate page content: {0}")]
    DegenerateContent(String),

    #[error("Browser session error: {0}")]
    SessionResource(String),

    #[error("Failed to capture {url} after {attempts} attempt(s). Last error: {source}")]
    CaptureExhausted {
        url: String,
        attempts: u32,
        source: Box<GrabError>,
    },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Generation rate limited: {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl GrabError {
    pub fn render_timeout(step: impl Into<String>, timeout: Duration) -> Self {
        GrabError::RenderTimeout {
            step: step.into(),
            timeout,
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        GrabError::SessionResource(message.into())
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        GrabError::Navigation(message.into())
    }

    /// True for failures a capture attempt may recover from by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GrabError::Navigation(_)
                | GrabError::RenderTimeout { .. }
                | GrabError::DegenerateContent(_)
                | GrabError::SessionResource(_)
                | GrabError::CaptureExhausted { .. }
                | GrabError::RateLimited(_)
        )
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            GrabError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            GrabError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            GrabError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            GrabError::Image(e) => ErrorPayload::new(
                ErrorCategory::Image,
                e.to_string(),
                "The browser returned unreadable screenshot data; retry the capture.",
            ),
            GrabError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON/serialization inputs; run with --verbose for details.",
            ),
            GrabError::Navigation(_)
            | GrabError::RenderTimeout { .. }
            | GrabError::DegenerateContent(_)
            | GrabError::SessionResource(_) => {
                capture_payload(self.to_string(), self.capture_remediation())
            }
            GrabError::CaptureExhausted { source, .. } => {
                capture_payload(self.to_string(), source.capture_remediation())
            }
            GrabError::Generation(msg) => ErrorPayload::new(
                ErrorCategory::Generation,
                msg.to_string(),
                "Check the generator backend (SITEGRAB_GENERATOR_CMD / SITEGRAB_GENERATOR_URL).",
            ),
            GrabError::RateLimited(msg) => ErrorPayload::new(
                ErrorCategory::Generation,
                msg.to_string(),
                "The model backend is rate limited; wait and retry.",
            )
            .retryable(),
            GrabError::Config(msg) => config_payload(msg),
            GrabError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }

    fn capture_remediation(&self) -> &'static str {
        match self {
            GrabError::Navigation(_) => {
                "Verify the URL is reachable from this machine; try increasing --nav-timeout."
            }
            GrabError::RenderTimeout { .. } => {
                "The page is slow to render; increase the screenshot/extraction timeouts or retry."
            }
            GrabError::DegenerateContent(_) => {
                "The site likely served a bot-check or error page; retry later or from another network."
            }
            GrabError::SessionResource(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("playwright npm package is missing") {
                    "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`)."
                } else if lower.contains("not found on path") {
                    "Install Node.js and ensure the node binary is on PATH; rerun after installing Playwright if needed."
                } else if lower.contains("chromium executable") || lower.contains("executable doesn't exist") {
                    "Run `npx playwright install chromium` to download the browser."
                } else {
                    "The browser session crashed; retry, and check memory limits in containerized runs."
                }
            }
            _ => "Retry the capture; run with --verbose for step-by-step progress.",
        }
    }
}

fn capture_payload(message: String, remediation: &str) -> ErrorPayload {
    ErrorPayload::new(ErrorCategory::Capture, message, remediation).retryable()
}

fn config_payload(msg: &str) -> ErrorPayload {
    let lower = msg.to_ascii_lowercase();
    let remediation = if lower.contains("generator") || lower.contains("sitegrab_generator") {
        "Set SITEGRAB_GENERATOR_URL, SITEGRAB_GENERATOR_CMD, or SITEGRAB_MOCK_HTML."
    } else if lower.contains("timeout") {
        "Timeouts must be positive durations (e.g., \"30s\")."
    } else if lower.contains("viewport") {
        "Use WIDTHxHEIGHT with positive values (e.g., 1920x1080)."
    } else {
        "Check flags/paths and the config file (--config)."
    };
    ErrorPayload::new(ErrorCategory::Config, msg.to_string(), remediation)
}

pub type Result<T> = std::result::Result<T, GrabError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Network,
    Capture,
    Generation,
    Image,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
            retryable: false,
        }
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_exhaustion_is_retryable_capture_category() {
        let err = GrabError::CaptureExhausted {
            url: "https://example.com".to_string(),
            attempts: 2,
            source: Box::new(GrabError::navigation("net::ERR_NAME_NOT_RESOLVED")),
        };
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Capture);
        assert!(payload.retryable);
        assert!(payload.message.contains("after 2 attempt(s)"));
        assert!(payload.message.contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn exhaustion_remediation_follows_last_cause() {
        let err = GrabError::CaptureExhausted {
            url: "https://example.com".to_string(),
            attempts: 3,
            source: Box::new(GrabError::DegenerateContent("markup too short".to_string())),
        };
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("bot-check"),
            "expected degenerate-content remediation, got: {remediation}"
        );
    }

    #[test]
    fn session_payload_includes_playwright_remediation() {
        let err = GrabError::session(
            "Playwright npm package is missing; install with `npm install playwright`.",
        );
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("npm install playwright"),
            "expected playwright install hint, got: {remediation}"
        );
    }

    #[test]
    fn session_payload_includes_node_install_hint() {
        let err = GrabError::session(
            "Unable to spawn Playwright helper; 'node' was not found on PATH",
        );
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("node"),
            "expected node install/path remediation, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_is_not_retryable() {
        let payload = GrabError::Config("Some other config issue".to_string()).to_payload();
        assert_eq!(payload.category, ErrorCategory::Config);
        assert!(!payload.retryable);
        assert!(payload
            .remediation
            .unwrap_or_default()
            .contains("Check flags/paths"));
    }

    #[test]
    fn config_payload_includes_generator_hint() {
        let payload =
            GrabError::Config("No generator backend configured".to_string()).to_payload();
        assert!(payload
            .remediation
            .unwrap_or_default()
            .contains("SITEGRAB_GENERATOR_URL"));
    }

    #[test]
    fn rate_limited_is_retryable_generation_error() {
        let err = GrabError::RateLimited("quota exceeded".to_string());
        assert!(err.is_retryable());
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Generation);
        assert!(payload.retryable);
    }

    #[test]
    fn capture_classes_are_retryable_others_are_not() {
        assert!(GrabError::navigation("timeout").is_retryable());
        assert!(GrabError::render_timeout("screenshot", Duration::from_secs(1)).is_retryable());
        assert!(GrabError::DegenerateContent("x".into()).is_retryable());
        assert!(GrabError::session("crashed").is_retryable());
        assert!(!GrabError::Config("bad".into()).is_retryable());
        assert!(!GrabError::Generation("bad".into()).is_retryable());
    }
}
