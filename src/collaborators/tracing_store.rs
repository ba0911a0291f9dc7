use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{TelemetryQuery, TracingStore};
use crate::coverage::correlator::TelemetryRecord;
use crate::error::ServiceError;

// Span attributes the tracing store indexes API identity under.
pub const SERVICE_NAME_ATTRIBUTE: &str = "service.name";
pub const API_NAME_ATTRIBUTE: &str = "api.name";
pub const API_VERSION_ATTRIBUTE: &str = "api.version";

/// Quote a value as a flux string literal.
fn flux_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn flux_equals(attribute: &str, value: &str) -> String {
    format!(
        "  |> filter(fn: (r) => r[{}] == {})",
        flux_string(attribute),
        flux_string(value)
    )
}

/// Build the flux-like query selecting one API's spans inside the lookback
/// window.
pub fn build_flux_query(bucket: &str, query: &TelemetryQuery) -> String {
    let mut lines = vec![
        format!("from(bucket: {})", flux_string(bucket)),
        format!("  |> range(start: -{}s)", query.lookback_secs),
        flux_equals(SERVICE_NAME_ATTRIBUTE, &query.service_name),
        flux_equals(API_NAME_ATTRIBUTE, &query.api_name),
    ];
    if let Some(version) = &query.api_version {
        lines.push(flux_equals(API_VERSION_ATTRIBUTE, version));
    }
    for filter in &query.attribute_filters {
        lines.push(flux_equals(&filter.key, &filter.value));
    }
    lines.join("\n")
}

/// Posts flux queries to `POST {base}/query` and reads back a JSON array of
/// telemetry records.
pub struct HttpTracingStore {
    client: reqwest::Client,
    base_url: Url,
    bucket: String,
    timeout: Duration,
}

impl HttpTracingStore {
    pub fn new(client: reqwest::Client, base_url: Url, bucket: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            bucket,
            timeout,
        }
    }

    fn query_url(&self) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::InvalidRequest(format!("tracing store url {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .push("query");
        Ok(url)
    }
}

#[async_trait]
impl TracingStore for HttpTracingStore {
    async fn query(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryRecord>, ServiceError> {
        let url = self.query_url()?;
        let flux = build_flux_query(&self.bucket, query);
        debug!("Querying tracing store {}:\n{}", url, flux);

        let resp = self
            .client
            .post(url.clone())
            .json(&serde_json::json!({ "query": flux }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ServiceError::TracingStoreUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::TracingStoreUnavailable(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        resp.json::<Vec<TelemetryRecord>>()
            .await
            .map_err(|e| ServiceError::TracingStoreUnavailable(e.to_string()))
    }
}

/// Records held in memory per service and API name.
#[derive(Debug, Clone, Default)]
pub struct StaticTracingStore {
    records: HashMap<(String, String), Vec<TelemetryRecord>>,
}

impl StaticTracingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(
        mut self,
        service_name: impl Into<String>,
        api_name: impl Into<String>,
        records: Vec<TelemetryRecord>,
    ) -> Self {
        self.records
            .entry((service_name.into(), api_name.into()))
            .or_default()
            .extend(records);
        self
    }
}

#[async_trait]
impl TracingStore for StaticTracingStore {
    async fn query(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryRecord>, ServiceError> {
        Ok(self
            .records
            .get(&(query.service_name.clone(), query.api_name.clone()))
            .cloned()
            .unwrap_or_default())
    }
}
