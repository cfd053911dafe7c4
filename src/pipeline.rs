//! Capture followed by cleaning, and optionally generation.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::capture::{extraction_failed_placeholder, CapturedContext, PageCapture};
use crate::clean::Cleaner;
use crate::generate::{generate_with_retry, GenerateOptions, GenerationRequest, MarkupGenerator};
use crate::output::CaptureArtifacts;
use crate::{GrabError, Result};

/// What the pipeline hands to the generator: two screenshots and the cleaned skeleton.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub url: String,
    pub desktop_image: Vec<u8>,
    pub mobile_image: Vec<u8>,
    pub cleaned_markup: String,
    /// Markup as extracted from the browser, before cleaning.
    pub raw_markup: Option<String>,
    pub markup_error: Option<String>,
    pub attempts: u32,
}

/// A page rebuilt by the generator together with the context it was built from.
#[derive(Debug, Clone)]
pub struct ClonedPage {
    pub context: PageContext,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct ContextPipeline {
    capture: PageCapture,
    cleaner: Cleaner,
}

impl ContextPipeline {
    pub fn new(capture: PageCapture, cleaner: Cleaner) -> Self {
        Self { capture, cleaner }
    }

    pub fn capture(&self) -> &PageCapture {
        &self.capture
    }

    pub fn cleaner(&self) -> &Cleaner {
        &self.cleaner
    }

    /// Captures `url` with the configured attempt budget and cleans its markup.
    pub async fn extract(&self, url: &str) -> Result<PageContext> {
        let captured = self.capture.capture(url).await?;
        self.context_from_capture(captured).await
    }

    /// Cleans the markup of an existing capture. Cleaning runs on the blocking pool.
    pub async fn context_from_capture(&self, captured: CapturedContext) -> Result<PageContext> {
        let url = captured.url().to_string();
        let attempts = captured.attempts();
        let (desktop_image, mobile_image, raw_markup, markup_error) = captured.into_parts();

        let cleaned_markup = match &raw_markup {
            Some(raw) => {
                let cleaner = self.cleaner.clone();
                let raw = raw.clone();
                tokio::task::spawn_blocking(move || cleaner.clean(Some(&raw)))
                    .await
                    .map_err(|e| GrabError::Unknown(format!("cleaning task failed: {e}")))?
            }
            None => {
                warn!(url = %url, "no markup captured; using placeholder");
                extraction_failed_placeholder(markup_error.as_deref())
            }
        };
        info!(
            url = %url,
            raw_bytes = raw_markup.as_ref().map(String::len).unwrap_or(0),
            cleaned_bytes = cleaned_markup.len(),
            "page context ready"
        );

        Ok(PageContext {
            url,
            desktop_image,
            mobile_image,
            cleaned_markup,
            raw_markup,
            markup_error,
            attempts,
        })
    }

    /// Extracts the context of `url` and asks `generator` to rebuild the page.
    pub async fn clone_page(
        &self,
        url: &str,
        generator: &dyn MarkupGenerator,
        options: &GenerateOptions,
    ) -> Result<ClonedPage> {
        let context = self.extract(url).await?;
        let request = GenerationRequest::from_context(
            &context,
            options.system_prompt(self.cleaner.options().policy),
        );
        let html = generate_with_retry(generator, &request, &options.retry).await?;
        if html.trim().is_empty() {
            return Err(GrabError::Generation(
                "generator returned no markup".to_string(),
            ));
        }
        Ok(ClonedPage { context, html })
    }
}

/// Directory for capture artifacts: the requested one, or a fresh temp dir.
/// The flag reports whether the caller picked it.
pub fn resolve_artifacts_dir(custom: Option<&Path>) -> (PathBuf, bool) {
    if let Some(dir) = custom {
        return (dir.to_path_buf(), true);
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = std::env::temp_dir().join(format!(
        "sitegrab-{}-{timestamp}",
        std::process::id()
    ));
    (dir, false)
}

/// Writes screenshots and markup of `context` into `dir`.
pub fn persist_artifacts(dir: &Path, context: &PageContext) -> Result<CaptureArtifacts> {
    std::fs::create_dir_all(dir)?;

    let desktop_screenshot = dir.join("desktop.png");
    std::fs::write(&desktop_screenshot, &context.desktop_image)?;
    let mobile_screenshot = dir.join("mobile.png");
    std::fs::write(&mobile_screenshot, &context.mobile_image)?;
    let cleaned_markup = dir.join("cleaned.html");
    std::fs::write(&cleaned_markup, &context.cleaned_markup)?;

    let raw_markup = match &context.raw_markup {
        Some(raw) => {
            let path = dir.join("raw.html");
            std::fs::write(&path, raw)?;
            Some(path)
        }
        None => None,
    };

    Ok(CaptureArtifacts {
        directory: dir.to_path_buf(),
        desktop_screenshot,
        mobile_screenshot,
        cleaned_markup,
        raw_markup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> PageContext {
        PageContext {
            url: "https://example.com".to_string(),
            desktop_image: vec![1, 2, 3],
            mobile_image: vec![4, 5],
            cleaned_markup: "<p>hi</p>".to_string(),
            raw_markup: None,
            markup_error: Some("content extraction timed out".to_string()),
            attempts: 1,
        }
    }

    #[test]
    fn resolve_artifacts_dir_prefers_custom() {
        let (dir, from_cli) = resolve_artifacts_dir(Some(Path::new("out")));
        assert_eq!(dir, PathBuf::from("out"));
        assert!(from_cli);

        let (dir, from_cli) = resolve_artifacts_dir(None);
        assert!(!from_cli);
        assert!(dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("sitegrab-")));
    }

    #[test]
    fn persist_artifacts_writes_each_file() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join("run");
        let artifacts = persist_artifacts(&dir, &context()).expect("persist");

        assert_eq!(std::fs::read(&artifacts.desktop_screenshot).unwrap(), vec![1, 2, 3]);
        assert_eq!(std::fs::read(&artifacts.mobile_screenshot).unwrap(), vec![4, 5]);
        assert_eq!(
            std::fs::read_to_string(&artifacts.cleaned_markup).unwrap(),
            "<p>hi</p>"
        );
        assert!(artifacts.raw_markup.is_none());
        assert!(!dir.join("raw.html").exists());
    }
}
