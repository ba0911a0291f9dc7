use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub reports: Option<i64>,
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let (status, reports) = match state.db.count_reports() {
        Ok(count) => ("ok", Some(count)),
        Err(e) => {
            tracing::warn!("Health check could not reach the report db: {}", e);
            ("degraded", None)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        reports,
    })
}
