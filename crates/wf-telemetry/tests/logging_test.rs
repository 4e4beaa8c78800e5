use wf_telemetry::logging::{self, LogFormat};

#[test]
fn test_init_logging_human() {
    // Should not panic; second call is a safe no-op.
    logging::init_logging("test-service", "debug");
    logging::init_logging("test-service", "info");

    tracing::info!(key = "value", "human-readable log line");
}

#[test]
fn test_init_logging_json() {
    // The global subscriber may already be set by another test; this no-ops.
    logging::init_logging_json("test-service-json", "info");

    tracing::info!(key = "value", "json log line");
}

#[test]
fn test_format_from_config() {
    assert_eq!(LogFormat::from_config("json"), LogFormat::Json);
    assert_eq!(LogFormat::from_config("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::from_config("human"), LogFormat::Human);
    assert_eq!(LogFormat::from_config("pretty"), LogFormat::Human);
    logging::init(LogFormat::Human, "format-test", "warn");
}
