use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use sitegrab_lib::{
    persist_artifacts, resolve_artifacts_dir, CaptureOutput, GrabError, SitegrabOutput,
    SITEGRAB_OUTPUT_VERSION,
};

use crate::cli::{OutputFormat, PolicyArg};
use crate::formatting::{render_error, write_output};
use crate::settings::{apply_overrides, format_effective_config, load_config};

/// Run the capture command.
#[allow(clippy::too_many_arguments)]
pub async fn run_capture(
    config_path: Option<PathBuf>,
    verbose: bool,
    format: OutputFormat,
    url: String,
    out: Option<PathBuf>,
    attempts: Option<u32>,
    policy: Option<PolicyArg>,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    if let Err(err) = apply_overrides(&mut config, attempts, policy) {
        return render_error(err, format, output);
    }
    if verbose {
        eprintln!("{}", format_effective_config(&config, config_path.as_deref()));
    }

    let pipeline = match config.build_pipeline() {
        Ok(pipeline) => pipeline,
        Err(err) => return render_error(err, format, output),
    };

    if verbose {
        eprintln!(
            "Capturing {} (up to {} attempt(s))…",
            url, config.capture.max_attempts
        );
    }
    let started = Instant::now();
    let context = match pipeline.extract(&url).await {
        Ok(context) => context,
        Err(err) => return render_error(err, format, output),
    };
    let elapsed = started.elapsed();

    let (artifacts_dir, from_cli) = resolve_artifacts_dir(out.as_deref());
    let artifacts = match persist_artifacts(&artifacts_dir, &context) {
        Ok(artifacts) => artifacts,
        Err(err) => return render_error(err, format, output),
    };
    if verbose {
        let origin = if from_cli { "requested" } else { "temporary" };
        eprintln!(
            "Saved artifacts to {} ({origin} directory)",
            artifacts_dir.display()
        );
    }

    let body = SitegrabOutput::Capture(CaptureOutput {
        version: SITEGRAB_OUTPUT_VERSION.to_string(),
        url: context.url.clone(),
        attempts: context.attempts,
        elapsed_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
        desktop_bytes: context.desktop_image.len(),
        mobile_bytes: context.mobile_image.len(),
        raw_markup_bytes: context.raw_markup.as_ref().map(String::len),
        cleaned_markup_bytes: context.cleaned_markup.len(),
        markup_error: context.markup_error.clone(),
        artifacts,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(GrabError::Config(err.to_string()), format, None);
    }
    ExitCode::SUCCESS
}
