use std::path::Path;

use sitegrab_lib::{CleaningPolicy, Config, GrabError};

use crate::cli::PolicyArg;

/// Load config from a TOML file, `./sitegrab.toml`, or return defaults.
/// Priority: explicit path > ./sitegrab.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, GrabError> {
    Config::load(path).map_err(|e| match e {
        GrabError::Config(msg) => GrabError::Config(msg),
        other => GrabError::Config(format!("Failed to load config: {other}")),
    })
}

/// Applies per-invocation flags on top of the loaded config.
pub fn apply_overrides(
    config: &mut Config,
    attempts: Option<u32>,
    policy: Option<PolicyArg>,
) -> Result<(), GrabError> {
    if let Some(attempts) = attempts {
        if attempts == 0 {
            return Err(GrabError::Config(
                "--attempts must be at least 1".to_string(),
            ));
        }
        config.capture.max_attempts = attempts;
    }
    if let Some(policy) = policy {
        config.clean.policy = CleaningPolicy::from(policy);
    }
    Ok(())
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let capture = &config.capture;
    format!(
        "Effective config [{source}]: driver={:?}, attempts={}, desktop={}, mobile={}, timeouts: nav={}s, screenshot={}s, content={}s, launch={}s, policy={}, generator retries={}",
        config.browser.driver,
        capture.max_attempts,
        capture.desktop_viewport,
        capture.mobile_viewport,
        capture.navigation_timeout.as_secs(),
        capture.screenshot_timeout.as_secs(),
        capture.content_timeout.as_secs(),
        config.browser.launch_timeout.as_secs(),
        config.clean.policy,
        config.generate.retry.max_retries,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_overrides_prefers_flags() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, Some(4), Some(PolicyArg::Fidelity)).expect("overrides");

        assert_eq!(cfg.capture.max_attempts, 4);
        assert_eq!(cfg.clean.policy, CleaningPolicy::Fidelity);
    }

    #[test]
    fn apply_overrides_keeps_config_when_flags_absent() {
        let mut cfg = Config::default();
        cfg.capture.max_attempts = 7;
        apply_overrides(&mut cfg, None, None).expect("overrides");

        assert_eq!(cfg.capture.max_attempts, 7);
        assert_eq!(cfg.clean.policy, CleaningPolicy::Structure);
    }

    #[test]
    fn apply_overrides_rejects_zero_attempts() {
        let mut cfg = Config::default();
        let err = apply_overrides(&mut cfg, Some(0), None).unwrap_err();
        assert!(matches!(err, GrabError::Config(_)));
    }

    #[test]
    fn format_effective_config_includes_all_fields() {
        let summary = format_effective_config(&Config::default(), Some(Path::new("sitegrab.toml")));
        assert!(summary.contains("driver=Playwright"));
        assert!(summary.contains("attempts=2"));
        assert!(summary.contains("desktop=1920x1080"));
        assert!(summary.contains("mobile=390x844"));
        assert!(summary.contains("nav=60s"));
        assert!(summary.contains("screenshot=30s"));
        assert!(summary.contains("policy=structure"));
        assert!(summary.contains("sitegrab.toml"));
    }
}
