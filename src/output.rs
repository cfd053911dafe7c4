use crate::error::ErrorPayload;
use crate::CleaningPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version for output payloads.
pub const SITEGRAB_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SitegrabOutput {
    Capture(CaptureOutput),
    Clean(CleanOutput),
    Clone(CloneOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureArtifacts {
    pub directory: PathBuf,
    pub desktop_screenshot: PathBuf,
    pub mobile_screenshot: PathBuf,
    pub cleaned_markup: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_markup: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutput {
    pub version: String,
    pub url: String,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub desktop_bytes: usize,
    pub mobile_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_markup_bytes: Option<usize>,
    pub cleaned_markup_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup_error: Option<String>,
    pub artifacts: CaptureArtifacts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanOutput {
    pub version: String,
    pub policy: CleaningPolicy,
    pub input_bytes: usize,
    pub cleaned: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutput {
    pub version: String,
    pub url: String,
    pub generator: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Present when the markup was not written to a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub html_bytes: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}
