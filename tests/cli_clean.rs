use sitegrab_lib::SitegrabOutput;
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn sitegrab() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sitegrab"));
    // Keep a developer's ./sitegrab.toml out of the picture.
    cmd.current_dir(std::env::temp_dir());
    cmd
}

#[test]
fn clean_file_prints_json_with_cleaned_markup() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("page.html");
    std::fs::write(
        &input,
        r#"<script>alert(1)</script><!-- note --><p id="x" data-track="y">hi</p>"#,
    )
    .expect("write input");

    let output = sitegrab()
        .args(["clean", "--input", input.to_str().unwrap()])
        .output()
        .expect("run sitegrab");
    assert_eq!(output.status.code(), Some(0));

    let body: SitegrabOutput = serde_json::from_slice(&output.stdout).expect("json output");
    match body {
        SitegrabOutput::Clean(out) => {
            assert_eq!(out.cleaned, r#"<p id="x">hi</p>"#);
            assert_eq!(out.policy, sitegrab_lib::CleaningPolicy::Structure);
        }
        other => panic!("expected clean output, got {other:?}"),
    }
}

#[test]
fn clean_reads_stdin_and_honours_policy_flag() {
    let mut child = sitegrab()
        .args(["clean", "--policy", "fidelity"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn sitegrab");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(br#"<div class="card" data-x="1">hi</div>"#)
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait sitegrab");
    assert_eq!(output.status.code(), Some(0));

    let body: SitegrabOutput = serde_json::from_slice(&output.stdout).expect("json output");
    match body {
        SitegrabOutput::Clean(out) => {
            assert_eq!(out.cleaned, r#"<div class="card">hi</div>"#);
            assert_eq!(out.policy, sitegrab_lib::CleaningPolicy::Fidelity);
        }
        other => panic!("expected clean output, got {other:?}"),
    }
}

#[test]
fn clean_uses_policy_from_config_file() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("page.html");
    let cfg = dir.path().join("sitegrab.toml");
    std::fs::write(&input, r#"<p class="lead">hi</p>"#).expect("write input");
    std::fs::write(&cfg, "[clean]\npolicy = \"fidelity\"\n").expect("write config");

    let output = sitegrab()
        .args([
            "--config",
            cfg.to_str().unwrap(),
            "clean",
            "--input",
            input.to_str().unwrap(),
        ])
        .output()
        .expect("run sitegrab");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(r#"class=\"lead\""#), "{stdout}");
}

#[test]
fn clean_writes_report_to_output_file() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("page.html");
    let report = dir.path().join("report.json");
    std::fs::write(&input, "").expect("write input");

    let status = sitegrab()
        .args([
            "clean",
            "--input",
            input.to_str().unwrap(),
            "--output",
            report.to_str().unwrap(),
        ])
        .status()
        .expect("run sitegrab");
    assert_eq!(status.code(), Some(0));

    let content = std::fs::read_to_string(&report).expect("report written");
    assert!(content.contains("\"mode\":\"clean\""));
    assert!(content.contains("HTML content was empty or not provided to cleaner"));
}

#[test]
fn missing_input_file_is_a_config_error() {
    let output = sitegrab()
        .args(["clean", "--input", "/definitely/not/here.html"])
        .output()
        .expect("run sitegrab");
    assert_eq!(output.status.code(), Some(2));

    let body: SitegrabOutput = serde_json::from_slice(&output.stdout).expect("json error");
    match body {
        SitegrabOutput::Error(err) => {
            assert!(err.error.message.contains("Failed to read input"));
            assert!(!err.error.retryable);
        }
        other => panic!("expected error output, got {other:?}"),
    }
}

#[test]
fn invalid_config_exits_with_error() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("bad.toml");
    std::fs::write(&cfg, "[capture]\nmax-attempts = 0\n").expect("write config");

    let output = sitegrab()
        .args([
            "--config",
            cfg.to_str().unwrap(),
            "capture",
            "--url",
            "https://example.com",
        ])
        .output()
        .expect("run sitegrab");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"mode\":\"error\""), "{stdout}");
    assert!(stdout.contains("max-attempts"), "{stdout}");
}

#[test]
fn capture_rejects_non_http_urls_before_launching() {
    let output = sitegrab()
        .args(["capture", "--url", "file:///etc/passwd"])
        .output()
        .expect("run sitegrab");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Unsupported URL scheme"), "{stdout}");
}

#[test]
fn clone_without_generator_backend_fails_fast() {
    let output = sitegrab()
        .args(["clone", "--url", "https://example.com"])
        .env_remove("SITEGRAB_MOCK_HTML")
        .env_remove("SITEGRAB_MOCK_HTML_PATH")
        .env_remove("SITEGRAB_GENERATOR_CMD")
        .env_remove("SITEGRAB_GENERATOR_URL")
        .output()
        .expect("run sitegrab");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No generator backend configured"), "{stdout}");
}
