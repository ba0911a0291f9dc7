use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::db::ReportDb;
use super::status::recompute_status;
use super::{ApiTestLookupError, ApiTestResult, ReportStatus, ResultMergePolicy};
use crate::bus::{CoverageResponse, MessageHandler};
use crate::collaborators::QualityGateConfigSource;
use crate::error::ServiceError;

/// Fan-in side: attaches per-API coverage results to their report and
/// re-derives the report status.
pub struct ResultListener {
    db: Arc<ReportDb>,
    configs: Arc<dyn QualityGateConfigSource>,
    merge_policy: ResultMergePolicy,
}

impl ResultListener {
    pub fn new(
        db: Arc<ReportDb>,
        configs: Arc<dyn QualityGateConfigSource>,
        merge_policy: ResultMergePolicy,
    ) -> Self {
        Self {
            db,
            configs,
            merge_policy,
        }
    }

    /// Returns the status the report settled on, or `None` when the result
    /// was dropped because its report does not exist.
    pub async fn on_result(
        &self,
        response: CoverageResponse,
    ) -> Result<Option<ReportStatus>, ServiceError> {
        let calculation_id = response.calculation_id;
        let Some(report) = self.db.get_report(calculation_id).map_err(ServiceError::Storage)? else {
            warn!(
                "Dropping coverage result for unknown report {} ({}/{})",
                calculation_id, response.service_name, response.api_name
            );
            return Ok(None);
        };

        let config = self
            .configs
            .find_by_name(&report.quality_gate_config_name)
            .await?
            .ok_or_else(|| ServiceError::ConfigMissingForReport {
                calculation_id,
                config_name: report.quality_gate_config_name.clone(),
            })?;

        let recorded_at = Utc::now();
        let results: Vec<ApiTestResult> = response
            .results
            .iter()
            .map(|result| ApiTestResult {
                criterion: result.criterion,
                coverage: result.coverage,
                duration_ms: result.duration_ms,
                diagnostic: result.diagnostic.clone(),
                included_in_report: config.includes(result.criterion),
                recorded_at,
            })
            .collect();
        let result_count = results.len();
        let policy = self.merge_policy;

        let outcome = self
            .db
            .update_report(calculation_id, |stored| {
                let test = stored
                    .find_api_test_mut(
                        &response.service_name,
                        &response.api_name,
                        response.api_version.as_deref(),
                    )
                    .map_err(|e| match e {
                        ApiTestLookupError::NoMatch => ServiceError::TestResultForUnknownApi {
                            calculation_id,
                            service_name: response.service_name.clone(),
                            api_name: response.api_name.clone(),
                            api_version: response.api_version.clone(),
                        },
                        ApiTestLookupError::Ambiguous(matches) => ServiceError::AmbiguousApiTest {
                            calculation_id,
                            service_name: response.service_name.clone(),
                            api_name: response.api_name.clone(),
                            api_version: response.api_version.clone(),
                            matches,
                        },
                    })?;
                test.attach(results, policy);
                recompute_status(stored);
                Ok::<_, ServiceError>(stored.report_status)
            })
            .map_err(ServiceError::Storage)?;

        match outcome {
            Some(Ok(status)) => {
                debug!(
                    "Attached {} results for {}/{} to report {}",
                    result_count, response.service_name, response.api_name, calculation_id
                );
                if status.is_terminal() {
                    info!("Report {} is {}", calculation_id, status);
                }
                Ok(Some(status))
            }
            Some(Err(e)) => Err(e),
            None => {
                warn!(
                    "Report {} was removed while attaching results, dropping",
                    calculation_id
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl MessageHandler<CoverageResponse> for ResultListener {
    async fn handle(&self, message: CoverageResponse) -> Result<(), ServiceError> {
        self.on_result(message).await.map(|_| ())
    }
}
