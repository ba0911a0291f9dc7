use std::io::Write;
use std::time::Duration;
use url::Url;

use api_coverage_gate::collaborators::catalog::HttpApiDocumentSource;
use api_coverage_gate::collaborators::config_source::{
    load_quality_gates_file, HttpQualityGateConfigSource,
};
use api_coverage_gate::collaborators::tracing_store::{build_flux_query, StaticTracingStore};
use api_coverage_gate::collaborators::{QualityGateConfigSource, TelemetryQuery, TracingStore};
use api_coverage_gate::coverage::correlator::TelemetryRecord;
use api_coverage_gate::coverage::CoverageCriterion;
use api_coverage_gate::report::{ApiTarget, AttributeFilter};

fn query(version: Option<&str>, filters: Vec<AttributeFilter>) -> TelemetryQuery {
    TelemetryQuery {
        service_name: "billing".to_string(),
        api_name: "invoices".to_string(),
        api_version: version.map(str::to_string),
        lookback_secs: 3600,
        attribute_filters: filters,
    }
}

#[test]
fn test_flux_query_selects_api_and_window() {
    let flux = build_flux_query("traces", &query(None, vec![]));
    let expected = [
        r#"from(bucket: "traces")"#,
        r#"  |> range(start: -3600s)"#,
        r#"  |> filter(fn: (r) => r["service.name"] == "billing")"#,
        r#"  |> filter(fn: (r) => r["api.name"] == "invoices")"#,
    ]
    .join("\n");
    assert_eq!(flux, expected);
}

#[test]
fn test_flux_query_adds_version_and_filters() {
    let flux = build_flux_query(
        "traces",
        &query(
            Some("v2"),
            vec![AttributeFilter {
                key: "deployment.environment".to_string(),
                value: "prod".to_string(),
            }],
        ),
    );
    let lines: Vec<&str> = flux.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[4], r#"  |> filter(fn: (r) => r["api.version"] == "v2")"#);
    assert_eq!(
        lines[5],
        r#"  |> filter(fn: (r) => r["deployment.environment"] == "prod")"#
    );
}

#[test]
fn test_flux_query_escapes_quotes() {
    let flux = build_flux_query(
        "traces",
        &query(
            None,
            vec![AttributeFilter {
                key: "team".to_string(),
                value: r#"a"b\c"#.to_string(),
            }],
        ),
    );
    assert!(flux.ends_with(r#"r["team"] == "a\"b\\c")"#));
}

#[test]
fn test_catalog_url_encodes_segments_and_version() {
    let source = HttpApiDocumentSource::new(
        reqwest::Client::new(),
        Url::parse("http://catalog.local/v1/").unwrap(),
        Duration::from_secs(5),
    );
    let url = source
        .document_url(&ApiTarget {
            service_name: "billing".to_string(),
            api_name: "invoices api".to_string(),
            api_version: Some("2.0".to_string()),
        })
        .unwrap();
    assert_eq!(
        url.as_str(),
        "http://catalog.local/v1/apis/billing/invoices%20api?version=2.0"
    );
}

#[test]
fn test_config_service_url() {
    let source = HttpQualityGateConfigSource::new(
        reqwest::Client::new(),
        Url::parse("http://config.local").unwrap(),
        Duration::from_secs(5),
    );
    assert_eq!(
        source.gate_url("strict").unwrap().as_str(),
        "http://config.local/quality-gates/strict"
    );
}

#[tokio::test]
async fn test_load_quality_gates_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"name": "strict", "includedCriteria": ["PATH_COVERAGE", "RESPONSE_CODE_COVERAGE"]}},
            {{"name": "observe-only"}}
        ]"#
    )
    .unwrap();

    let source = load_quality_gates_file(file.path()).unwrap();
    assert_eq!(source.len(), 2);

    let strict = source.find_by_name("strict").await.unwrap().unwrap();
    assert!(strict.includes(CoverageCriterion::ResponseCodeCoverage));
    let observe = source.find_by_name("observe-only").await.unwrap().unwrap();
    assert!(observe.included_criteria.is_empty());
    assert!(source.find_by_name("missing").await.unwrap().is_none());
}

#[test]
fn test_load_quality_gates_file_rejects_bad_json() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert!(load_quality_gates_file(file.path()).is_err());
}

#[tokio::test]
async fn test_static_tracing_store_scopes_by_api() {
    let store = StaticTracingStore::new()
        .with_records("billing", "invoices", vec![TelemetryRecord::new("a", "t")])
        .with_records("billing", "payments", vec![TelemetryRecord::new("b", "t")]);

    let records = store.query(&query(None, vec![])).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].span_id, "a");
}
