use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::coverage::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Quality gate config '{0}' not found")]
    ConfigNotFound(String),

    /// The config existed when the report was dispatched, so losing it later
    /// is an unreachable state.
    #[error("Quality gate config '{config_name}' for report {calculation_id} disappeared after dispatch")]
    ConfigMissingForReport {
        calculation_id: Uuid,
        config_name: String,
    },

    #[error("TestResultForUnknownApiException: report {calculation_id} has no api test for {service_name}/{api_name} version {api_version:?}")]
    TestResultForUnknownApi {
        calculation_id: Uuid,
        service_name: String,
        api_name: String,
        api_version: Option<String>,
    },

    #[error("Report {calculation_id} has {matches} api tests for {service_name}/{api_name} version {api_version:?}")]
    AmbiguousApiTest {
        calculation_id: Uuid,
        service_name: String,
        api_name: String,
        api_version: Option<String>,
        matches: usize,
    },

    #[error("Report {0} not found")]
    ReportNotFound(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("OpenAPI document unavailable: {0}")]
    DocumentUnavailable(String),

    #[error("Tracing store unavailable: {0}")]
    TracingStoreUnavailable(String),

    #[error("Config service unavailable: {0}")]
    ConfigServiceUnavailable(String),

    #[error("Message bus error: {0}")]
    Bus(String),

    #[error("Calculator registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl ServiceError {
    /// Infrastructure failures that bus redelivery may cure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::DocumentUnavailable(_)
                | ServiceError::TracingStoreUnavailable(_)
                | ServiceError::ConfigServiceUnavailable(_)
                | ServiceError::Bus(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::ConfigNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ReportNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::DocumentUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::TracingStoreUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::ConfigServiceUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::ConfigMissingForReport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::TestResultForUnknownApi { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::AmbiguousApiTest { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Bus(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
