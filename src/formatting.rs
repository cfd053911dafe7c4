use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sitegrab_lib::{ErrorOutput, GrabError, SitegrabOutput, SITEGRAB_OUTPUT_VERSION};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &SitegrabOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: GrabError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let code = exit_code_for_error(&err);
    let error_payload = err.to_payload();
    let payload = SitegrabOutput::Error(ErrorOutput {
        version: SITEGRAB_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    code
}

/// Exit code 3 marks a capture that exhausted its attempts; callers may retry later.
pub fn exit_code_for_error(err: &GrabError) -> ExitCode {
    match err {
        GrabError::CaptureExhausted { .. } => ExitCode::from(3),
        _ => ExitCode::from(2),
    }
}

/// Write JSON output to file or stdout.
fn write_json_output(
    body: &SitegrabOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty output to file or stdout.
fn write_pretty_output(body: &SitegrabOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content = serde_json::to_string_pretty(body)
        .unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &SitegrabOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        SitegrabOutput::Capture(out) => {
            let header = color("[CAPTURE]", "32", colorize);
            writeln!(buf, "{} {}", header, out.url).ok();
            writeln!(
                buf,
                "Attempts: {} ({:.1}s)",
                out.attempts,
                out.elapsed_ms as f64 / 1000.0
            )
            .ok();
            writeln!(buf, "Screenshots:").ok();
            writeln!(buf, "- {:8} {}", "desktop", human_bytes(out.desktop_bytes)).ok();
            writeln!(buf, "- {:8} {}", "mobile", human_bytes(out.mobile_bytes)).ok();
            match out.raw_markup_bytes {
                Some(raw) => {
                    writeln!(
                        buf,
                        "Markup: {} raw -> {} cleaned",
                        human_bytes(raw),
                        human_bytes(out.cleaned_markup_bytes)
                    )
                    .ok();
                }
                None => {
                    let reason = out.markup_error.as_deref().unwrap_or("unknown reason");
                    let warning = color("missing", "33", colorize);
                    writeln!(buf, "Markup: {} ({})", warning, reason).ok();
                }
            }

            let art = &out.artifacts;
            let mut paths = vec![
                ("directory", art.directory.clone()),
                ("desktop", art.desktop_screenshot.clone()),
                ("mobile", art.mobile_screenshot.clone()),
                ("cleaned", art.cleaned_markup.clone()),
            ];
            if let Some(raw) = &art.raw_markup {
                paths.push(("raw", raw.clone()));
            }
            writeln!(buf, "Artifacts:").ok();
            for (label, path) in paths {
                writeln!(buf, "- {:10} {}", label, path.display()).ok();
            }
        }
        SitegrabOutput::Clean(out) => {
            let header = color("[CLEAN]", "36", colorize);
            writeln!(
                buf,
                "{} policy {} ({} -> {})",
                header,
                out.policy,
                human_bytes(out.input_bytes),
                human_bytes(out.cleaned.len())
            )
            .ok();
            writeln!(buf, "{}", out.cleaned).ok();
        }
        SitegrabOutput::Clone(out) => {
            let header = color("[CLONE]", "34", colorize);
            writeln!(buf, "{} {} via {}", header, out.url, out.generator).ok();
            writeln!(
                buf,
                "Capture attempts: {}, generated {}",
                out.attempts,
                human_bytes(out.html_bytes)
            )
            .ok();
            if let Some(path) = &out.output_path {
                writeln!(buf, "Written to: {}", path.display()).ok();
            }
            if !out.notes.is_empty() {
                writeln!(buf, "Notes:").ok();
                for note in &out.notes {
                    writeln!(buf, "- {}", note).ok();
                }
            }
        }
        SitegrabOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or(out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            if out.error.retryable {
                writeln!(buf, "This failure may succeed on retry.").ok();
            }
        }
    }
    buf
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

fn human_bytes(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitegrab_lib::error::{ErrorCategory, ErrorPayload};
    use sitegrab_lib::{CaptureArtifacts, CaptureOutput, CleanOutput, CleaningPolicy};
    use std::path::PathBuf;

    #[test]
    fn render_error_uses_fatal_exit_code() {
        let code = render_error(
            GrabError::Config("boom".to_string()),
            OutputFormat::Json,
            None,
        );
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn capture_exhaustion_gets_retry_exit_code() {
        let err = GrabError::CaptureExhausted {
            url: "https://example.com".to_string(),
            attempts: 2,
            source: Box::new(GrabError::DegenerateContent("Access Denied".to_string())),
        };
        assert_eq!(exit_code_for_error(&err), ExitCode::from(3));
    }

    #[test]
    fn format_pretty_includes_screenshots_and_artifacts() {
        let output = SitegrabOutput::Capture(CaptureOutput {
            version: SITEGRAB_OUTPUT_VERSION.to_string(),
            url: "https://example.com".to_string(),
            attempts: 1,
            elapsed_ms: 8300,
            desktop_bytes: 2048,
            mobile_bytes: 900,
            raw_markup_bytes: Some(3 * 1024 * 1024),
            cleaned_markup_bytes: 4096,
            markup_error: None,
            artifacts: CaptureArtifacts {
                directory: PathBuf::from("/tmp/sitegrab-run"),
                desktop_screenshot: PathBuf::from("/tmp/sitegrab-run/desktop.png"),
                mobile_screenshot: PathBuf::from("/tmp/sitegrab-run/mobile.png"),
                cleaned_markup: PathBuf::from("/tmp/sitegrab-run/cleaned.html"),
                raw_markup: Some(PathBuf::from("/tmp/sitegrab-run/raw.html")),
            },
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[CAPTURE] https://example.com"));
        assert!(pretty.contains("Attempts: 1 (8.3s)"));
        assert!(pretty.contains("2.0 KiB"));
        assert!(pretty.contains("900 B"));
        assert!(pretty.contains("3.0 MiB raw -> 4.0 KiB cleaned"));
        assert!(pretty.contains("/tmp/sitegrab-run/raw.html"));
    }

    #[test]
    fn format_pretty_reports_missing_markup() {
        let output = SitegrabOutput::Capture(CaptureOutput {
            version: SITEGRAB_OUTPUT_VERSION.to_string(),
            url: "https://example.com".to_string(),
            attempts: 2,
            elapsed_ms: 0,
            desktop_bytes: 1,
            mobile_bytes: 1,
            raw_markup_bytes: None,
            cleaned_markup_bytes: 10,
            markup_error: Some("content extraction timed out".to_string()),
            artifacts: CaptureArtifacts {
                directory: PathBuf::from("out"),
                desktop_screenshot: PathBuf::from("out/desktop.png"),
                mobile_screenshot: PathBuf::from("out/mobile.png"),
                cleaned_markup: PathBuf::from("out/cleaned.html"),
                raw_markup: None,
            },
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("Markup: missing (content extraction timed out)"));
        assert!(!pretty.contains("raw "));
    }

    #[test]
    fn format_pretty_prints_cleaned_markup() {
        let output = SitegrabOutput::Clean(CleanOutput {
            version: SITEGRAB_OUTPUT_VERSION.to_string(),
            policy: CleaningPolicy::Structure,
            input_bytes: 120,
            cleaned: "<p id=\"x\">hi</p>".to_string(),
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[CLEAN] policy structure (120 B -> 16 B)"));
        assert!(pretty.contains("<p id=\"x\">hi</p>"));
    }

    #[test]
    fn format_pretty_handles_errors() {
        let output = SitegrabOutput::Error(ErrorOutput {
            version: SITEGRAB_OUTPUT_VERSION.to_string(),
            message: Some("bad input".to_string()),
            error: ErrorPayload {
                category: ErrorCategory::Config,
                message: "bad input".to_string(),
                remediation: Some("check flags".to_string()),
                retryable: false,
            },
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[ERROR] bad input"));
        assert!(pretty.contains("Hint: check flags"));
        assert!(!pretty.contains("retry"));
    }
}
