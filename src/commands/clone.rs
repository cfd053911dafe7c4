use std::path::PathBuf;
use std::process::ExitCode;

use sitegrab_lib::generate::{ENV_MOCK_HTML, ENV_MOCK_HTML_PATH};
use sitegrab_lib::{
    generator_from_env, CloneOutput, GrabError, SitegrabOutput, SITEGRAB_OUTPUT_VERSION,
};

use crate::cli::{OutputFormat, PolicyArg};
use crate::formatting::{render_error, write_output};
use crate::settings::{apply_overrides, format_effective_config, load_config};

/// Run the clone command.
pub async fn run_clone(
    config_path: Option<PathBuf>,
    verbose: bool,
    format: OutputFormat,
    url: String,
    output: Option<PathBuf>,
    attempts: Option<u32>,
    policy: Option<PolicyArg>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, None),
    };
    if let Err(err) = apply_overrides(&mut config, attempts, policy) {
        return render_error(err, format, None);
    }
    if verbose {
        eprintln!("{}", format_effective_config(&config, config_path.as_deref()));
    }

    // Resolve the backend before launching a browser.
    let generator = match generator_from_env(&config.generate) {
        Ok(generator) => generator,
        Err(err) => return render_error(err, format, None),
    };
    let pipeline = match config.build_pipeline() {
        Ok(pipeline) => pipeline,
        Err(err) => return render_error(err, format, None),
    };

    if verbose {
        eprintln!("Cloning {} with generator '{}'…", url, generator.name());
    }
    let cloned = match pipeline
        .clone_page(&url, generator.as_ref(), &config.generate)
        .await
    {
        Ok(cloned) => cloned,
        Err(err) => return render_error(err, format, None),
    };

    if let Some(path) = &output {
        if verbose {
            eprintln!("Writing generated HTML to {}", path.display());
        }
        if let Err(err) = std::fs::write(path, cloned.html.as_bytes()) {
            return render_error(GrabError::Io(err), format, None);
        }
    }

    let mut notes = Vec::new();
    if let Some(reason) = &cloned.context.markup_error {
        notes.push(format!(
            "Markup extraction failed ({reason}); the generator only saw screenshots."
        ));
    }
    if generator.name() == "mock" {
        notes.push(format!(
            "Using {ENV_MOCK_HTML}/{ENV_MOCK_HTML_PATH}; no model was invoked."
        ));
    }

    let body = SitegrabOutput::Clone(CloneOutput {
        version: SITEGRAB_OUTPUT_VERSION.to_string(),
        url: cloned.context.url.clone(),
        generator: generator.name().to_string(),
        attempts: cloned.context.attempts,
        output_path: output.clone(),
        html_bytes: cloned.html.len(),
        html: output.is_none().then_some(cloned.html),
        notes,
    });
    if let Err(err) = write_output(&body, format, None) {
        return render_error(GrabError::Config(err.to_string()), format, None);
    }
    ExitCode::SUCCESS
}
