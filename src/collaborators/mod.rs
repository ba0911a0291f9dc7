//! Seams to the services this one depends on but does not own.

pub mod catalog;
pub mod config_source;
pub mod tracing_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coverage::correlator::TelemetryRecord;
use crate::coverage::operation_index::OpenApiDocument;
use crate::error::ServiceError;
use crate::report::{ApiTarget, AttributeFilter, QualityGateConfig};

#[async_trait]
pub trait QualityGateConfigSource: Send + Sync {
    /// `Ok(None)` when no gate exists under that name.
    async fn find_by_name(&self, name: &str) -> Result<Option<QualityGateConfig>, ServiceError>;
}

#[async_trait]
pub trait ApiDocumentSource: Send + Sync {
    /// The already-parsed document for one API, or `DocumentUnavailable`
    /// when it is not indexed or could not be parsed upstream.
    async fn fetch_document(&self, target: &ApiTarget) -> Result<OpenApiDocument, ServiceError>;
}

/// Everything the tracing store needs to select one API's traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryQuery {
    pub service_name: String,
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub lookback_secs: u64,
    #[serde(default)]
    pub attribute_filters: Vec<AttributeFilter>,
}

#[async_trait]
pub trait TracingStore: Send + Sync {
    async fn query(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryRecord>, ServiceError>;
}
