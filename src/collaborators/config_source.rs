use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::QualityGateConfigSource;
use crate::error::ServiceError;
use crate::report::QualityGateConfig;

// ============================================================================
// HTTP config service
// ============================================================================

/// Looks gates up at `GET {base}/quality-gates/{name}`.
pub struct HttpQualityGateConfigSource {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpQualityGateConfigSource {
    pub fn new(client: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            timeout,
        }
    }

    pub fn gate_url(&self, name: &str) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::InvalidRequest(format!("config service url {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(["quality-gates", name]);
        Ok(url)
    }
}

#[async_trait]
impl QualityGateConfigSource for HttpQualityGateConfigSource {
    async fn find_by_name(&self, name: &str) -> Result<Option<QualityGateConfig>, ServiceError> {
        let url = self.gate_url(name)?;
        debug!("Fetching quality gate config from {}", url);

        let resp = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ServiceError::ConfigServiceUnavailable(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::ConfigServiceUnavailable(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        let config = resp
            .json::<QualityGateConfig>()
            .await
            .map_err(|e| ServiceError::ConfigServiceUnavailable(e.to_string()))?;
        Ok(Some(config))
    }
}

// ============================================================================
// Local definitions
// ============================================================================

/// Gates defined up front, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct StaticQualityGateConfigSource {
    gates: HashMap<String, QualityGateConfig>,
}

impl StaticQualityGateConfigSource {
    pub fn new(gates: impl IntoIterator<Item = QualityGateConfig>) -> Self {
        Self {
            gates: gates
                .into_iter()
                .map(|gate| (gate.name.clone(), gate))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

#[async_trait]
impl QualityGateConfigSource for StaticQualityGateConfigSource {
    async fn find_by_name(&self, name: &str) -> Result<Option<QualityGateConfig>, ServiceError> {
        Ok(self.gates.get(name).cloned())
    }
}

/// Load gate definitions from a JSON array file, e.g.
/// `[{"name": "strict", "includedCriteria": ["PATH_COVERAGE"]}]`.
pub fn load_quality_gates_file(path: &Path) -> anyhow::Result<StaticQualityGateConfigSource> {
    let content = std::fs::read_to_string(path)?;
    let gates: Vec<QualityGateConfig> = serde_json::from_str(&content)?;
    info!("Loaded {} quality gates from {:?}", gates.len(), path);
    Ok(StaticQualityGateConfigSource::new(gates))
}
