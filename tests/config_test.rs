//! Tests for config loading and conversion into engine settings

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use scrapeflow::config::Config;
use scrapeflow::engine::OrchestratorSettings;
use scrapeflow::models::{Action, ContentArea};
use scrapeflow::scheduler::DaemonConfig;

#[test]
fn test_shipped_config_is_valid() {
    let config = Config::from_file(Path::new("config.toml")).expect("config.toml should parse");
    config.validate().unwrap();

    let daemon = DaemonConfig::from_settings(&config.daemon).unwrap();
    assert_eq!(daemon.interval, Duration::from_secs(360 * 60));
    assert_eq!(daemon.actions, vec![Action::Download]);
    assert_eq!(
        daemon.areas,
        vec![ContentArea::Timeline, ContentArea::Stories, ContentArea::Messages]
    );
}

#[test]
fn test_settings_from_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[engine]
workers = 6
throttle_bytes_per_sec = 524288
strict_claims = true

[retry]
max_attempts = 5
initial_wait_ms = 500
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    let settings = OrchestratorSettings::from_config(&config);

    assert_eq!(settings.workers, 6);
    assert!(settings.strict_claims);
    assert_eq!(settings.throttle_bytes_per_sec, 524_288);
    assert_eq!(settings.retry.max_attempts, 5);
    assert_eq!(settings.retry.initial_wait, Duration::from_millis(500));
    assert_eq!(settings.retry.max_wait, Duration::from_secs(30));
}

#[test]
fn test_missing_file_reports_path() {
    let err = Config::from_file(Path::new("does/not/exist.toml")).unwrap_err();
    assert!(err.to_string().contains("does/not/exist.toml"));
}

#[test]
fn test_unknown_area_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[daemon]\nareas = [\"timeline\", \"reels\"]").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().is_ok());
    let err = DaemonConfig::from_settings(&config.daemon).unwrap_err();
    assert!(err.to_string().contains("reels"));
}
