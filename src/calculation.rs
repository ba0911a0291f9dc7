use async_trait::async_trait;
use futures::future::try_join;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{CalculationRequest, CoverageResponse, MessageBus, MessageHandler};
use crate::collaborators::{ApiDocumentSource, TracingStore};
use crate::coverage::coordinator::CoverageCoordinator;
use crate::coverage::correlator::correlate;
use crate::coverage::operation_index::OperationIndex;
use crate::error::ServiceError;

/// Answers one calculation request with one coverage response.
pub struct CalculationWorker {
    documents: Arc<dyn ApiDocumentSource>,
    tracing: Arc<dyn TracingStore>,
    coordinator: CoverageCoordinator,
    bus: Arc<dyn MessageBus>,
}

impl CalculationWorker {
    pub fn new(
        documents: Arc<dyn ApiDocumentSource>,
        tracing: Arc<dyn TracingStore>,
        coordinator: CoverageCoordinator,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            documents,
            tracing,
            coordinator,
            bus,
        }
    }

    /// Computes the response without publishing it. Collaborator failures
    /// propagate so the bus can redeliver the request.
    pub async fn compute(&self, request: &CalculationRequest) -> Result<CoverageResponse, ServiceError> {
        let target = request.target();
        let query = request.telemetry_query();

        let (document, records) = try_join(
            self.documents.fetch_document(&target),
            self.tracing.query(&query),
        )
        .await?;

        let index = OperationIndex::build(Some(&document));
        let record_count = records.len();
        let telemetry = correlate(records);
        debug!(
            "Calculation {} for {}/{}: {} operations, {} records over {} operation keys",
            request.calculation_id,
            request.service_name,
            request.api_name,
            index.len(),
            record_count,
            telemetry.len()
        );

        let results = self.coordinator.calculate(&index, &telemetry);
        Ok(CoverageResponse {
            calculation_id: request.calculation_id,
            service_name: request.service_name.clone(),
            api_name: request.api_name.clone(),
            api_version: request.api_version.clone(),
            results: results.into_values().collect(),
        })
    }
}

#[async_trait]
impl MessageHandler<CalculationRequest> for CalculationWorker {
    async fn handle(&self, request: CalculationRequest) -> Result<(), ServiceError> {
        let response = self.compute(&request).await?;
        if response.results.is_empty() {
            warn!(
                "Calculation {} for {}/{} produced no results (nothing documented or nothing observed)",
                request.calculation_id, request.service_name, request.api_name
            );
        } else {
            info!(
                "Calculation {} for {}/{} produced {} results",
                request.calculation_id,
                request.service_name,
                request.api_name,
                response.results.len()
            );
        }
        self.bus.publish_coverage_response(response).await
    }
}
