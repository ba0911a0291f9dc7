use chrono::{Duration, Utc};

use api_coverage_gate::coverage::{Coverage, CoverageCriterion};
use api_coverage_gate::report::db::{ReportDb, REPORT_DB_FILENAME};
use api_coverage_gate::report::status::{compute_status, with_recomputed_status};
use api_coverage_gate::report::{
    ApiTarget, ApiTestLookupError, ApiTestResult, AttributeFilter, QualityGateConfig,
    QualityGateReport, ReportParameters, ReportStatus, ResultMergePolicy,
};

fn target(service: &str, api: &str, version: Option<&str>) -> ApiTarget {
    ApiTarget {
        service_name: service.to_string(),
        api_name: api.to_string(),
        api_version: version.map(str::to_string),
    }
}

fn params() -> ReportParameters {
    ReportParameters {
        lookback_secs: 3600,
        attribute_filters: vec![AttributeFilter {
            key: "deployment.environment".to_string(),
            value: "prod".to_string(),
        }],
    }
}

fn result(criterion: CoverageCriterion, hundredths: u16, included: bool) -> ApiTestResult {
    ApiTestResult {
        criterion,
        coverage: Coverage::from_hundredths(hundredths),
        duration_ms: 3,
        diagnostic: None,
        included_in_report: included,
        recorded_at: Utc::now(),
    }
}

fn two_api_report() -> QualityGateReport {
    QualityGateReport::new(
        "strict",
        vec![
            target("billing", "invoices", None),
            target("billing", "payments", Some("v2")),
        ],
        params(),
    )
}

// ============================================================================
// Status reducer
// ============================================================================

#[test]
fn test_status_without_api_tests_is_not_started() {
    let report = QualityGateReport::new("strict", vec![], params());
    assert_eq!(compute_status(&report), ReportStatus::NotStarted);
}

#[test]
fn test_status_in_progress_while_any_test_lacks_results() {
    let mut report = two_api_report();
    report.api_tests[0]
        .results
        .push(result(CoverageCriterion::PathCoverage, 100, true));
    assert_eq!(compute_status(&report), ReportStatus::InProgress);

    // Even a failing result elsewhere does not end the report early.
    report.api_tests[0]
        .results
        .push(result(CoverageCriterion::HttpMethodCoverage, 10, true));
    assert_eq!(compute_status(&report), ReportStatus::InProgress);
}

#[test]
fn test_status_passed_when_all_included_are_full() {
    let mut report = two_api_report();
    for test in &mut report.api_tests {
        test.results.push(result(CoverageCriterion::PathCoverage, 100, true));
    }
    let report = with_recomputed_status(report);
    assert_eq!(report.report_status, ReportStatus::Passed);
}

#[test]
fn test_status_failed_on_included_partial_coverage() {
    let mut report = two_api_report();
    report.api_tests[0]
        .results
        .push(result(CoverageCriterion::PathCoverage, 100, true));
    report.api_tests[1]
        .results
        .push(result(CoverageCriterion::PathCoverage, 80, true));
    assert_eq!(compute_status(&report), ReportStatus::Failed);
}

#[test]
fn test_excluded_results_never_fail_the_report() {
    let mut report = two_api_report();
    for test in &mut report.api_tests {
        test.results.push(result(CoverageCriterion::PathCoverage, 100, true));
        test.results
            .push(result(CoverageCriterion::HeaderParameterCoverage, 80, false));
    }
    assert_eq!(compute_status(&report), ReportStatus::Passed);
}

#[test]
fn test_status_wire_names() {
    assert_eq!(
        serde_json::to_value(ReportStatus::InProgress).unwrap(),
        serde_json::json!("IN_PROGRESS")
    );
    assert_eq!("FAILED".parse::<ReportStatus>().unwrap(), ReportStatus::Failed);
    assert!(ReportStatus::Passed.is_terminal());
    assert!(!ReportStatus::NotStarted.is_terminal());
}

// ============================================================================
// Api test matching and merging
// ============================================================================

#[test]
fn test_unversioned_test_matches_any_version() {
    let mut report = two_api_report();
    assert!(report
        .find_api_test_mut("billing", "invoices", Some("v7"))
        .is_ok());
    assert!(report.find_api_test_mut("billing", "invoices", None).is_ok());
}

#[test]
fn test_versioned_test_requires_same_version() {
    let mut report = two_api_report();
    assert!(report
        .find_api_test_mut("billing", "payments", Some("v2"))
        .is_ok());
    assert_eq!(
        report
            .find_api_test_mut("billing", "payments", Some("v3"))
            .unwrap_err(),
        ApiTestLookupError::NoMatch
    );
    assert!(report.find_api_test_mut("billing", "payments", None).is_err());
    assert!(report.find_api_test_mut("shipping", "invoices", None).is_err());
}

#[test]
fn test_pinned_version_wins_over_unversioned() {
    let mut report = QualityGateReport::new(
        "strict",
        vec![
            target("billing", "invoices", None),
            target("billing", "invoices", Some("v2")),
        ],
        params(),
    );
    let pinned_id = report.api_tests[1].id;
    let found = report
        .find_api_test_mut("billing", "invoices", Some("v2"))
        .unwrap();
    assert_eq!(found.id, pinned_id);
}

#[test]
fn test_equal_candidates_are_ambiguous() {
    let mut report = QualityGateReport::new(
        "strict",
        vec![
            target("billing", "invoices", Some("v2")),
            target("billing", "invoices", Some("v2")),
            target("billing", "payments", None),
            target("billing", "payments", None),
        ],
        params(),
    );
    assert_eq!(
        report
            .find_api_test_mut("billing", "invoices", Some("v2"))
            .unwrap_err(),
        ApiTestLookupError::Ambiguous(2)
    );
    assert_eq!(
        report
            .find_api_test_mut("billing", "payments", None)
            .unwrap_err(),
        ApiTestLookupError::Ambiguous(2)
    );
}

#[test]
fn test_replace_policy_keeps_one_result_per_criterion() {
    let mut report = two_api_report();
    let test = &mut report.api_tests[0];
    test.attach(
        vec![
            result(CoverageCriterion::PathCoverage, 50, true),
            result(CoverageCriterion::HttpMethodCoverage, 40, true),
        ],
        ResultMergePolicy::Replace,
    );
    test.attach(
        vec![result(CoverageCriterion::PathCoverage, 100, true)],
        ResultMergePolicy::Replace,
    );

    assert_eq!(test.results.len(), 2);
    let path = test
        .results
        .iter()
        .find(|r| r.criterion == CoverageCriterion::PathCoverage)
        .unwrap();
    assert!(path.coverage.is_full());
}

#[test]
fn test_accumulate_policy_keeps_duplicates() {
    let mut report = two_api_report();
    let test = &mut report.api_tests[0];
    test.attach(
        vec![result(CoverageCriterion::PathCoverage, 50, true)],
        ResultMergePolicy::Accumulate,
    );
    test.attach(
        vec![result(CoverageCriterion::PathCoverage, 100, true)],
        ResultMergePolicy::Accumulate,
    );
    assert_eq!(test.results.len(), 2);
}

#[test]
fn test_quality_gate_config_inclusion() {
    let config: QualityGateConfig = serde_json::from_value(serde_json::json!({
        "name": "paths-only",
        "includedCriteria": ["PATH_COVERAGE"]
    }))
    .unwrap();
    assert!(config.includes(CoverageCriterion::PathCoverage));
    assert!(!config.includes(CoverageCriterion::HttpMethodCoverage));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_db_creates_file_in_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let db = ReportDb::new(&dir.path().join("nested")).unwrap();
    assert_eq!(
        db.db_path().unwrap(),
        dir.path().join("nested").join(REPORT_DB_FILENAME)
    );
    assert!(db.db_path().unwrap().exists());
}

#[test]
fn test_db_round_trips_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let db = ReportDb::new(dir.path()).unwrap();

    let mut report = two_api_report();
    report.api_tests[0].results.push(ApiTestResult {
        diagnostic: Some("Uncovered paths: /x".to_string()),
        ..result(CoverageCriterion::PathCoverage, 67, true)
    });
    report.api_tests[0]
        .results
        .push(result(CoverageCriterion::HeaderParameterCoverage, 0, false));
    db.save_report(&report).unwrap();

    let loaded = db.get_report(report.calculation_id).unwrap().unwrap();
    assert_eq!(loaded.calculation_id, report.calculation_id);
    assert_eq!(loaded.quality_gate_config_name, "strict");
    assert_eq!(loaded.parameters, report.parameters);
    assert_eq!(loaded.report_status, ReportStatus::NotStarted);
    assert_eq!(loaded.api_tests.len(), 2);
    assert_eq!(loaded.api_tests[0].id, report.api_tests[0].id);
    assert_eq!(loaded.api_tests[1].api_version.as_deref(), Some("v2"));

    let results = &loaded.api_tests[0].results;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].criterion, CoverageCriterion::PathCoverage);
    assert_eq!(results[0].coverage.hundredths(), 67);
    assert_eq!(results[0].diagnostic.as_deref(), Some("Uncovered paths: /x"));
    assert!(!results[1].included_in_report);
    assert!(loaded.api_tests[1].results.is_empty());
}

#[test]
fn test_db_get_missing_report() {
    let db = ReportDb::open_in_memory().unwrap();
    assert!(db.get_report(uuid::Uuid::new_v4()).unwrap().is_none());
    assert_eq!(db.count_reports().unwrap(), 0);
}

#[test]
fn test_db_update_report_writes_on_success_only() {
    let db = ReportDb::open_in_memory().unwrap();
    let report = two_api_report();
    let id = report.calculation_id;
    db.save_report(&report).unwrap();

    let outcome = db
        .update_report(id, |stored| {
            stored.report_status = ReportStatus::InProgress;
            Ok::<_, String>(())
        })
        .unwrap();
    assert_eq!(outcome, Some(Ok(())));
    let stored = db.get_report(id).unwrap().unwrap();
    assert_eq!(stored.report_status, ReportStatus::InProgress);
    assert!(stored.updated_at >= report.updated_at);

    let outcome = db
        .update_report(id, |stored| {
            stored.report_status = ReportStatus::Failed;
            Err::<(), _>("rejected".to_string())
        })
        .unwrap();
    assert_eq!(outcome, Some(Err("rejected".to_string())));
    assert_eq!(
        db.get_report(id).unwrap().unwrap().report_status,
        ReportStatus::InProgress
    );

    let missing = db
        .update_report(uuid::Uuid::new_v4(), |_| Ok::<_, String>(()))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_db_lists_only_unfinished_before_cutoff() {
    let db = ReportDb::open_in_memory().unwrap();

    let pending = two_api_report();
    db.save_report(&pending).unwrap();

    let mut done = two_api_report();
    done.report_status = ReportStatus::Passed;
    db.save_report(&done).unwrap();

    let future = Utc::now() + Duration::minutes(5);
    let stale = db.list_unfinished_before(future).unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].calculation_id, pending.calculation_id);

    let past = Utc::now() - Duration::minutes(5);
    assert!(db.list_unfinished_before(past).unwrap().is_empty());
    assert_eq!(db.count_reports().unwrap(), 2);
}
