use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{BrowserDriver, PlaywrightDriver, DEFAULT_LAUNCH_TIMEOUT};
use crate::capture::{CaptureOptions, PageCapture};
use crate::clean::{Cleaner, CleanerOptions};
use crate::generate::GenerateOptions;
use crate::pipeline::ContextPipeline;
use crate::{GrabError, Result};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "sitegrab.toml";

/// Browser automation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Node.js + the `playwright` package.
    #[default]
    Playwright,
    /// Chrome DevTools Protocol via `chromiumoxide` (needs the `cdp` feature).
    Cdp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    pub driver: DriverKind,
    pub node_command: String,
    #[serde(with = "humantime_serde")]
    pub launch_timeout: Duration,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Playwright,
            node_command: "node".to_string(),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            chrome_executable: None,
        }
    }
}

impl BrowserConfig {
    pub fn build_driver(&self) -> Result<Arc<dyn BrowserDriver>> {
        match self.driver {
            DriverKind::Playwright => Ok(Arc::new(
                PlaywrightDriver::new(self.node_command.clone())
                    .with_launch_timeout(self.launch_timeout),
            )),
            #[cfg(feature = "cdp")]
            DriverKind::Cdp => {
                let mut driver =
                    crate::browser::CdpDriver::new().with_launch_timeout(self.launch_timeout);
                if let Some(path) = &self.chrome_executable {
                    driver = driver.with_executable(path.clone());
                }
                Ok(Arc::new(driver))
            }
            #[cfg(not(feature = "cdp"))]
            DriverKind::Cdp => Err(GrabError::Config(
                "driver = \"cdp\" requires sitegrab built with the `cdp` feature".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub browser: BrowserConfig,
    pub capture: CaptureOptions,
    pub clean: CleanerOptions,
    pub generate: GenerateOptions,
}

impl Config {
    /// Reads `path`, else `./sitegrab.toml` when it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };
        let Some(path) = path else {
            debug!("no config file; using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(&path).map_err(|e| {
            GrabError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&text)
            .map_err(|e| GrabError::Config(format!("Invalid config ({}): {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, String> {
        let config: Config = toml::from_str(text).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        let capture = &self.capture;
        if capture.max_attempts == 0 {
            return Err("capture.max-attempts must be at least 1".to_string());
        }
        for (name, viewport) in [
            ("capture.desktop-viewport", capture.desktop_viewport),
            ("capture.mobile-viewport", capture.mobile_viewport),
            ("capture.session.viewport", capture.session.viewport),
        ] {
            if viewport.is_empty() {
                return Err(format!("{name} must have a positive width and height"));
            }
        }
        for (name, timeout) in [
            ("capture.navigation-timeout", capture.navigation_timeout),
            ("capture.screenshot-timeout", capture.screenshot_timeout),
            ("capture.content-timeout", capture.content_timeout),
            ("capture.step-timeout", capture.step_timeout),
            ("browser.launch-timeout", self.browser.launch_timeout),
            ("generate.request-timeout", self.generate.request_timeout),
        ] {
            if timeout.is_zero() {
                return Err(format!("{name} must be a positive timeout"));
            }
        }
        if self.browser.node_command.trim().is_empty() {
            return Err("browser.node-command must not be empty".to_string());
        }
        if self.clean.max_input_bytes == 0 {
            return Err("clean.max-input-bytes must be positive".to_string());
        }
        Ok(())
    }

    pub fn build_capture(&self) -> Result<PageCapture> {
        Ok(PageCapture::new(
            self.browser.build_driver()?,
            self.capture.clone(),
        ))
    }

    pub fn build_pipeline(&self) -> Result<ContextPipeline> {
        Ok(ContextPipeline::new(
            self.build_capture()?,
            Cleaner::new(self.clean.clone()),
        ))
    }
}
