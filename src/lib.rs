//! Sitegrab Library
//!
//! Captures the visual and structural context of a live web page: full-page
//! screenshots at a desktop and a mobile viewport plus the rendered markup,
//! reduced by a structural cleaner to a compact skeleton. The result is the
//! grounding context a model needs to rebuild the page.
//!
//! # Module Overview
//!
//! - [`browser`] - Headless browser drivers (Playwright helper, optional CDP)
//! - [`capture`] - Retrying page capture with guaranteed session release
//! - [`clean`] - Structural HTML cleaning and pretty printing
//! - [`pipeline`] - Capture followed by cleaning, and page cloning
//! - [`generate`] - Markup generator backends and their retry policy
//! - [`config`] - Configuration file support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use sitegrab_lib::{Cleaner, Config, ContextPipeline, PageCapture};
//!
//! # async fn example() -> sitegrab_lib::Result<()> {
//! let config = Config::default();
//! let capture = PageCapture::new(config.browser.build_driver()?, config.capture.clone());
//! let pipeline = ContextPipeline::new(capture, Cleaner::new(config.clean.clone()));
//!
//! let context = pipeline.extract("https://example.com").await?;
//! println!(
//!     "desktop {} bytes, mobile {} bytes, skeleton:\n{}",
//!     context.desktop_image.len(),
//!     context.mobile_image.len(),
//!     context.cleaned_markup
//! );
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod capture;
pub mod clean;
pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod viewport;

#[cfg(feature = "cdp")]
pub use browser::CdpDriver;
pub use browser::{
    BrowserDriver, BrowserSession, ContentScope, PlaywrightDriver, SessionOptions, WaitUntil,
};
pub use capture::{CaptureOptions, CapturedContext, DegenerateCheck, PageCapture};
pub use clean::{clean_markup, AllowListPolicy, Cleaner, CleanerOptions, CleaningPolicy};
pub use config::{BrowserConfig, Config, DriverKind};
pub use error::{GrabError, Result};
pub use generate::{
    default_system_prompt, generate_with_retry, generator_from_env, strip_code_fences,
    CommandGenerator,
    GenerateOptions, GenerationRequest, HttpGenerator, MarkupGenerator, MockGenerator,
    RetryPolicy,
};
pub use output::{
    CaptureArtifacts, CaptureOutput, CleanOutput, CloneOutput, ErrorOutput, SitegrabOutput,
    SITEGRAB_OUTPUT_VERSION,
};
pub use pipeline::{
    persist_artifacts, resolve_artifacts_dir, ClonedPage, ContextPipeline, PageContext,
};
pub use viewport::Viewport;
