use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::db::ReportDb;
use super::status::recompute_status;
use super::{ApiTarget, QualityGateReport, ReportParameters};
use crate::bus::{CalculationRequest, MessageBus};
use crate::collaborators::QualityGateConfigSource;
use crate::error::ServiceError;

/// Fan-out side: creates the report and one calculation request per target.
pub struct DispatchOrchestrator {
    db: Arc<ReportDb>,
    configs: Arc<dyn QualityGateConfigSource>,
    bus: Arc<dyn MessageBus>,
}

impl DispatchOrchestrator {
    pub fn new(
        db: Arc<ReportDb>,
        configs: Arc<dyn QualityGateConfigSource>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self { db, configs, bus }
    }

    /// Fails before anything is persisted or sent when the gate is unknown.
    /// The report is stored NOT_STARTED before the first message goes out,
    /// so an immediate result always finds it.
    pub async fn initialize(
        &self,
        quality_gate_config_name: &str,
        targets: Vec<ApiTarget>,
        parameters: ReportParameters,
    ) -> Result<QualityGateReport, ServiceError> {
        if targets.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "at least one target api is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &targets {
            let key = (
                target.service_name.as_str(),
                target.api_name.as_str(),
                target.api_version.as_deref(),
            );
            if !seen.insert(key) {
                return Err(ServiceError::InvalidRequest(format!(
                    "duplicate target {}/{} version {:?}",
                    target.service_name, target.api_name, target.api_version
                )));
            }
        }

        self.configs
            .find_by_name(quality_gate_config_name)
            .await?
            .ok_or_else(|| ServiceError::ConfigNotFound(quality_gate_config_name.to_string()))?;

        let report = QualityGateReport::new(quality_gate_config_name, targets, parameters);
        let calculation_id = report.calculation_id;
        self.db.save_report(&report).map_err(ServiceError::Storage)?;

        info!(
            "Dispatching calculation {} for gate '{}' over {} apis",
            calculation_id,
            quality_gate_config_name,
            report.api_tests.len()
        );

        for (sent, test) in report.api_tests.iter().enumerate() {
            if let Err(e) = self
                .bus
                .publish_calculation_request(CalculationRequest::for_api_test(&report, test))
                .await
            {
                error!(
                    "Dispatch of calculation {} stopped after {}/{} requests, report left unfinished: {}",
                    calculation_id,
                    sent,
                    report.api_tests.len(),
                    e
                );
                return Err(e);
            }
        }

        // Results may already have landed; recompute rather than overwrite.
        let updated = self
            .db
            .update_report(calculation_id, |stored| {
                recompute_status(stored);
                Ok::<_, ServiceError>(stored.clone())
            })
            .map_err(ServiceError::Storage)?;

        match updated {
            Some(Ok(report)) => Ok(report),
            Some(Err(e)) => Err(e),
            None => {
                warn!("Report {} vanished right after dispatch", calculation_id);
                Err(ServiceError::ReportNotFound(calculation_id))
            }
        }
    }

    pub fn get_report(&self, calculation_id: uuid::Uuid) -> Result<QualityGateReport, ServiceError> {
        self.db
            .get_report(calculation_id)
            .map_err(ServiceError::Storage)?
            .ok_or(ServiceError::ReportNotFound(calculation_id))
    }
}

