pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::TelemetryQuery;
use crate::coverage::CoverageResult;
use crate::error::ServiceError;
use crate::report::{ApiTarget, ApiTest, AttributeFilter, QualityGateReport};

// ============================================================================
// Wire messages (both keyed by calculation id)
// ============================================================================

/// Asks a calculation step to compute coverage for one api test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    pub calculation_id: Uuid,
    pub service_name: String,
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Seconds of telemetry to look back over.
    pub lookback_window: u64,
    #[serde(default)]
    pub attribute_filters: Vec<AttributeFilter>,
}

impl CalculationRequest {
    pub fn for_api_test(report: &QualityGateReport, test: &ApiTest) -> Self {
        Self {
            calculation_id: report.calculation_id,
            service_name: test.service_name.clone(),
            api_name: test.api_name.clone(),
            api_version: test.api_version.clone(),
            lookback_window: report.parameters.lookback_secs,
            attribute_filters: report.parameters.attribute_filters.clone(),
        }
    }

    pub fn target(&self) -> ApiTarget {
        ApiTarget {
            service_name: self.service_name.clone(),
            api_name: self.api_name.clone(),
            api_version: self.api_version.clone(),
        }
    }

    pub fn telemetry_query(&self) -> TelemetryQuery {
        TelemetryQuery {
            service_name: self.service_name.clone(),
            api_name: self.api_name.clone(),
            api_version: self.api_version.clone(),
            lookback_secs: self.lookback_window,
            attribute_filters: self.attribute_filters.clone(),
        }
    }
}

/// Per-API coverage computed by a calculation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageResponse {
    pub calculation_id: Uuid,
    pub service_name: String,
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub results: Vec<CoverageResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub key: Uuid,
    /// 1 on first delivery.
    pub attempt: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(key: Uuid, payload: T) -> Self {
        Self {
            key,
            attempt: 1,
            payload,
        }
    }
}

// ============================================================================
// Seams
// ============================================================================

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish_calculation_request(&self, request: CalculationRequest) -> Result<(), ServiceError>;

    async fn publish_coverage_response(&self, response: CoverageResponse) -> Result<(), ServiceError>;
}

/// Consumer side of one topic.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, message: T) -> Result<(), ServiceError>;
}
