use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::db::ReportDb;
use super::{QualityGateReport, ReportStatus};

/// What the stale-report listing exposes about a stuck report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleReport {
    pub calculation_id: Uuid,
    pub quality_gate_config_name: String,
    pub report_status: ReportStatus,
    pub updated_at: DateTime<Utc>,
    /// Api tests that have not received a single result yet.
    pub pending_api_tests: usize,
}

impl From<&QualityGateReport> for StaleReport {
    fn from(report: &QualityGateReport) -> Self {
        Self {
            calculation_id: report.calculation_id,
            quality_gate_config_name: report.quality_gate_config_name.clone(),
            report_status: report.report_status,
            updated_at: report.updated_at,
            pending_api_tests: report
                .api_tests
                .iter()
                .filter(|test| test.results.is_empty())
                .count(),
        }
    }
}

/// Non-terminal reports not updated within `threshold`.
pub fn find_stale_reports(db: &ReportDb, threshold: Duration) -> anyhow::Result<Vec<StaleReport>> {
    let cutoff = Utc::now() - chrono::Duration::from_std(threshold)?;
    Ok(db
        .list_unfinished_before(cutoff)?
        .iter()
        .map(StaleReport::from)
        .collect())
}

/// Spawn the stale-report monitor. It only reports; statuses are never touched.
pub fn spawn_stale_report_monitor(
    db: Arc<ReportDb>,
    threshold: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Stale report monitor started (threshold {}s, every {}s)",
            threshold.as_secs(),
            interval.as_secs()
        );

        loop {
            sleep(interval).await;

            let stale = match find_stale_reports(&db, threshold) {
                Ok(stale) => stale,
                Err(e) => {
                    error!("Stale report scan failed: {}", e);
                    continue;
                }
            };

            for report in &stale {
                warn!(
                    "Report {} for gate '{}' stuck in {} since {} ({} api tests without results)",
                    report.calculation_id,
                    report.quality_gate_config_name,
                    report.report_status,
                    report.updated_at,
                    report.pending_api_tests
                );
            }
        }
    })
}
