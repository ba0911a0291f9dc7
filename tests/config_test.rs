use clap::Parser;
use std::path::PathBuf;

use api_coverage_gate::config::*;
use api_coverage_gate::report::ResultMergePolicy;

fn parse(extra: &[&str]) -> CliArgs {
    let mut argv = vec![
        "api-coverage-gate",
        "--catalog-url",
        "http://catalog.local",
        "--tracing-store-url",
        "http://traces.local",
    ];
    argv.extend_from_slice(extra);
    CliArgs::try_parse_from(argv).unwrap()
}

#[test]
fn test_defaults() {
    let config = ServiceConfig::from_args(parse(&["--quality-gates-file", "gates.json"])).unwrap();

    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    assert_eq!(config.quality_gates, QualityGateSource::File(PathBuf::from("gates.json")));
    assert_eq!(config.tracing_bucket, DEFAULT_TRACING_BUCKET);
    assert_eq!(config.default_lookback_secs, DEFAULT_LOOKBACK_SECS);
    assert_eq!(config.stale_report_after.as_secs(), DEFAULT_STALE_REPORT_SECS);
    assert_eq!(config.result_merge, ResultMergePolicy::Replace);
    assert_eq!(config.max_delivery_attempts, DEFAULT_MAX_DELIVERY_ATTEMPTS);
    assert!(config.log_dir.is_none());
}

#[test]
fn test_config_service_and_overrides() {
    let config = ServiceConfig::from_args(parse(&[
        "--config-service-url",
        "http://config.local/api",
        "--port",
        "9000",
        "--result-merge",
        "accumulate",
        "--stale-report-secs",
        "90",
        "--log-dir",
        "/var/log/gate",
    ]))
    .unwrap();

    match &config.quality_gates {
        QualityGateSource::Service(url) => assert_eq!(url.as_str(), "http://config.local/api"),
        other => panic!("unexpected gate source {:?}", other),
    }
    assert_eq!(config.port, 9000);
    assert_eq!(config.result_merge, ResultMergePolicy::Accumulate);
    assert_eq!(config.stale_report_after.as_secs(), 90);
    assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/gate")));
}

#[test]
fn test_gate_source_is_required() {
    assert!(ServiceConfig::from_args(parse(&[])).is_err());
}

#[test]
fn test_gate_sources_are_exclusive() {
    let argv = [
        "api-coverage-gate",
        "--catalog-url",
        "http://catalog.local",
        "--tracing-store-url",
        "http://traces.local",
        "--config-service-url",
        "http://config.local",
        "--quality-gates-file",
        "gates.json",
    ];
    assert!(CliArgs::try_parse_from(argv).is_err());
}

#[test]
fn test_zero_delivery_attempts_rejected() {
    let args = parse(&["--quality-gates-file", "gates.json", "--max-delivery-attempts", "0"]);
    assert!(ServiceConfig::from_args(args).is_err());
}

#[test]
fn test_invalid_url_rejected() {
    let argv = [
        "api-coverage-gate",
        "--catalog-url",
        "not a url",
        "--tracing-store-url",
        "http://traces.local",
    ];
    assert!(CliArgs::try_parse_from(argv).is_err());
}
