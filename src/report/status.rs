use super::{QualityGateReport, ReportStatus};

/// Reduce the current set of attached results to a report status.
///
/// Recomputing from scratch on every result makes arrival order irrelevant.
pub fn compute_status(report: &QualityGateReport) -> ReportStatus {
    if report.api_tests.is_empty() {
        return ReportStatus::NotStarted;
    }
    if report.api_tests.iter().any(|test| test.results.is_empty()) {
        return ReportStatus::InProgress;
    }
    let failed = report
        .api_tests
        .iter()
        .flat_map(|test| test.results.iter())
        .any(|result| result.included_in_report && !result.coverage.is_full());
    if failed {
        ReportStatus::Failed
    } else {
        ReportStatus::Passed
    }
}

/// Report with its status recomputed.
pub fn with_recomputed_status(mut report: QualityGateReport) -> QualityGateReport {
    recompute_status(&mut report);
    report
}

pub fn recompute_status(report: &mut QualityGateReport) {
    report.report_status = compute_status(report);
}
