use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sitegrab_lib::{Cleaner, CleanOutput, GrabError, SitegrabOutput, SITEGRAB_OUTPUT_VERSION};
use tokio::io::AsyncReadExt;

use crate::cli::{OutputFormat, PolicyArg};
use crate::formatting::{render_error, write_output};
use crate::settings::{apply_overrides, load_config};

/// Run the clean command.
pub async fn run_clean(
    config_path: Option<PathBuf>,
    verbose: bool,
    format: OutputFormat,
    input: Option<PathBuf>,
    policy: Option<PolicyArg>,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, None),
    };
    if let Err(err) = apply_overrides(&mut config, None, policy) {
        return render_error(err, format, None);
    }

    let raw = match read_input(input.as_deref()).await {
        Ok(raw) => raw,
        Err(err) => return render_error(err, format, None),
    };
    if verbose {
        eprintln!(
            "Cleaning {} bytes with the {} policy…",
            raw.len(),
            config.clean.policy
        );
    }

    let cleaner = Cleaner::new(config.clean.clone());
    let cleaned = cleaner.clean(Some(&raw));

    let body = SitegrabOutput::Clean(CleanOutput {
        version: SITEGRAB_OUTPUT_VERSION.to_string(),
        policy: config.clean.policy,
        input_bytes: raw.len(),
        cleaned,
    });
    if let Err(err) = write_output(&body, format, output) {
        return render_error(GrabError::Config(err.to_string()), format, None);
    }
    ExitCode::SUCCESS
}

/// Reads the file, or stdin when no path is given. Invalid UTF-8 is replaced.
async fn read_input(path: Option<&Path>) -> Result<String, GrabError> {
    let bytes = match path {
        Some(path) => tokio::fs::read(path).await.map_err(|e| {
            GrabError::Config(format!("Failed to read input {}: {e}", path.display()))
        })?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
