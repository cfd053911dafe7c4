//! Structural cleaning of rendered markup.
//!
//! Turns a script-laden DOM into a compact skeleton: scripts, styles and other
//! non-structural subtrees are removed, comments dropped, `<picture>` elements
//! flattened to a single `<img>`, and attributes reduced to an allow-list.
//! The result is pretty printed so it diffs well and reads well in a prompt.
//!
//! Cleaning never fails: empty input and internal failures both come back as
//! an HTML comment describing what happened.
//!
//! # Example
//!
//! ```
//! use sitegrab_lib::clean_markup;
//!
//! let cleaned = clean_markup(Some(
//!     r#"<script>alert(1)</script><!-- note --><p id="x" data-track="y">hi</p>"#,
//! ));
//! assert_eq!(cleaned, r#"<p id="x">hi</p>"#);
//! ```

mod policy;
mod serialize;
mod tree;

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use policy::{AllowListPolicy, CleaningPolicy};

use serialize::PrettyPrinter;

/// Returned for `None`, empty and whitespace-only input.
pub const EMPTY_INPUT_PLACEHOLDER: &str =
    "<!-- HTML content was empty or not provided to cleaner -->";

pub const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CleanerOptions {
    pub policy: CleaningPolicy,
    /// Larger inputs are refused with the failure placeholder.
    pub max_input_bytes: usize,
    /// Spaces per nesting level in the output.
    pub indent_width: usize,
}

impl Default for CleanerOptions {
    fn default() -> Self {
        Self {
            policy: CleaningPolicy::Structure,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            indent_width: 1,
        }
    }
}

impl CleanerOptions {
    pub fn with_policy(policy: CleaningPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }
}

/// Why a cleaning pass produced the failure placeholder.
#[derive(Debug, Error)]
pub(crate) enum CleanFailure {
    #[error("input is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("markup nests deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("internal error: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone)]
pub struct Cleaner {
    options: CleanerOptions,
    allow_list: AllowListPolicy,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new(CleanerOptions::default())
    }
}

impl Cleaner {
    pub fn new(options: CleanerOptions) -> Self {
        let allow_list = options.policy.allow_list();
        Self {
            options,
            allow_list,
        }
    }

    /// Replaces the allow-list derived from the policy.
    pub fn with_allow_list(mut self, allow_list: AllowListPolicy) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn options(&self) -> &CleanerOptions {
        &self.options
    }

    pub fn allow_list(&self) -> &AllowListPolicy {
        &self.allow_list
    }

    /// Cleans `raw`; always returns markup or a placeholder comment.
    pub fn clean(&self, raw: Option<&str>) -> String {
        let raw = match raw {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return EMPTY_INPUT_PLACEHOLDER.to_string(),
        };
        let cleaned = contained(|| self.try_clean(raw));
        debug!(
            input_bytes = raw.len(),
            output_bytes = cleaned.len(),
            policy = %self.options.policy,
            "cleaned markup"
        );
        cleaned
    }

    fn try_clean(&self, raw: &str) -> Result<String, CleanFailure> {
        if raw.len() > self.options.max_input_bytes {
            return Err(CleanFailure::TooLarge {
                size: raw.len(),
                limit: self.options.max_input_bytes,
            });
        }
        let policy = self.options.policy;
        let nodes = tree::parse(raw, policy)?;
        let mut nodes = tree::flatten_pictures(nodes, policy.keeps_presentation());
        tree::filter_attributes(&mut nodes, &self.allow_list);
        Ok(PrettyPrinter::new(self.options.indent_width).print(&nodes))
    }
}

/// Cleans with the default structure-only policy.
pub fn clean_markup(raw: Option<&str>) -> String {
    Cleaner::default().clean(raw)
}

/// The comment emitted when cleaning could not complete.
pub fn failure_placeholder(reason: &str) -> String {
    format!(
        "<!-- HTML cleaning process failed: {} -->",
        reason.replace("--", "- -")
    )
}

/// Runs a cleaning pass, turning errors and panics into the failure placeholder.
fn contained(pass: impl FnOnce() -> Result<String, CleanFailure>) -> String {
    let outcome = panic::catch_unwind(AssertUnwindSafe(pass)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic while cleaning".to_string());
        Err(CleanFailure::Panicked(message))
    });
    match outcome {
        Ok(cleaned) if !cleaned.is_empty() => cleaned,
        Ok(_) => EMPTY_INPUT_PLACEHOLDER.to_string(),
        Err(err) => {
            warn!(error = %err, "HTML cleaning failed");
            failure_placeholder(&err.to_string())
        }
    }
}
