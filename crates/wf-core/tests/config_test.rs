use std::io::Write;

use wf_core::config::Config;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, "human");
    assert_eq!(cfg.api.base_url, "http://127.0.0.1:8000");
    assert_eq!(cfg.api.ws_base(), "ws://127.0.0.1:8000");
    assert_eq!(cfg.sync.poll_initial_secs, 30);
    assert_eq!(cfg.sync.poll_max_secs, 120);
    assert_eq!(cfg.sync.poll_backoff_factor, 2);
    assert_eq!(cfg.sync.silence_threshold_secs, 180);
    assert_eq!(cfg.sync.retry_window_secs, 10);
    assert_eq!(cfg.sync.cancel_refresh_delay_ms, 1_000);
    assert_eq!(cfg.logs.max_per_step, 100);
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("poll_initial_secs"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.api.base_url, cfg.api.base_url);
    assert_eq!(parsed.sync.poll_max_secs, cfg.sync.poll_max_secs);
    assert_eq!(parsed.logs.max_per_step, cfg.logs.max_per_step);
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[api]
base_url = "https://roadmaps.example"

[sync]
silence_threshold_secs = 60
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.api.base_url, "https://roadmaps.example");
    assert_eq!(cfg.api.ws_base(), "wss://roadmaps.example");
    assert_eq!(cfg.sync.silence_threshold_secs, 60);
    // defaults should fill in the rest
    assert_eq!(cfg.sync.poll_initial_secs, 30);
    assert_eq!(cfg.logs.max_per_step, 100);
    cfg.validate().expect("config validates");
}

#[test]
fn explicit_ws_base_wins() {
    let cfg: Config = toml::from_str(
        r#"
[api]
base_url = "http://api.local:8000/"
ws_base_url = "ws://events.local:9000/"
"#,
    )
    .unwrap();
    assert_eq!(cfg.api.ws_base(), "ws://events.local:9000");
}

#[test]
fn initial_interval_above_max_fails_validation() {
    let mut cfg = Config::default();
    cfg.sync.poll_initial_secs = 300;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("poll_initial_secs"));
}

#[test]
fn zero_log_cap_fails_validation() {
    let mut cfg = Config::default();
    cfg.logs.max_per_step = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[logs]\nmax_per_step = 25").unwrap();
    let cfg = Config::load_from(file.path()).expect("load");
    assert_eq!(cfg.logs.max_per_step, 25);
}

#[test]
fn load_from_rejects_garbage() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "this is = = not toml").unwrap();
    let err = Config::load_from(file.path()).expect_err("parse error");
    assert!(err.to_string().starts_with("parse"));
}
