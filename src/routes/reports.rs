use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::report::monitor::{find_stale_reports, StaleReport};
use crate::report::{ApiTarget, AttributeFilter, QualityGateReport, ReportParameters, ReportStatus};
use crate::state::SharedState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCalculationRequest {
    #[serde(default)]
    pub targets: Vec<ApiTarget>,
    pub lookback_secs: Option<u64>,
    #[serde(default)]
    pub attribute_filters: Vec<AttributeFilter>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCalculationResponse {
    pub calculation_id: Uuid,
    pub status: ReportStatus,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn start_calculation(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(req): Json<StartCalculationRequest>,
) -> Result<(StatusCode, Json<StartCalculationResponse>), ServiceError> {
    let parameters = ReportParameters {
        lookback_secs: req.lookback_secs.unwrap_or(state.default_lookback_secs),
        attribute_filters: req.attribute_filters,
    };

    let report = state
        .dispatcher
        .initialize(&name, req.targets, parameters)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartCalculationResponse {
            calculation_id: report.calculation_id,
            status: report.report_status,
        }),
    ))
}

pub async fn get_report(
    State(state): State<SharedState>,
    Path(calculation_id): Path<Uuid>,
) -> Result<Json<QualityGateReport>, ServiceError> {
    state.dispatcher.get_report(calculation_id).map(Json)
}

pub async fn stale_reports(
    State(state): State<SharedState>,
) -> Result<Json<Vec<StaleReport>>, ServiceError> {
    find_stale_reports(&state.db, state.stale_report_after)
        .map(Json)
        .map_err(ServiceError::Storage)
}
