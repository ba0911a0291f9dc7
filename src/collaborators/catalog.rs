use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::ApiDocumentSource;
use crate::coverage::operation_index::OpenApiDocument;
use crate::error::ServiceError;
use crate::report::ApiTarget;

/// Reads parsed documents from the catalog at
/// `GET {base}/apis/{service}/{api}[?version=..]`.
pub struct HttpApiDocumentSource {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpApiDocumentSource {
    pub fn new(client: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            timeout,
        }
    }

    pub fn document_url(&self, target: &ApiTarget) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::InvalidRequest(format!("catalog url {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(["apis", target.service_name.as_str(), target.api_name.as_str()]);
        if let Some(version) = &target.api_version {
            url.query_pairs_mut().append_pair("version", version);
        }
        Ok(url)
    }
}

#[async_trait]
impl ApiDocumentSource for HttpApiDocumentSource {
    async fn fetch_document(&self, target: &ApiTarget) -> Result<OpenApiDocument, ServiceError> {
        let url = self.document_url(target)?;
        debug!("Fetching OpenAPI document from {}", url);

        let resp = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ServiceError::DocumentUnavailable(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::DocumentUnavailable(format!(
                "{}/{} is not indexed",
                target.service_name, target.api_name
            )));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::DocumentUnavailable(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        resp.json::<OpenApiDocument>()
            .await
            .map_err(|e| ServiceError::DocumentUnavailable(format!("unparseable document: {}", e)))
    }
}

/// Documents held in memory, keyed by service and API name. The requested
/// version is not consulted.
#[derive(Debug, Clone, Default)]
pub struct StaticApiDocumentSource {
    documents: HashMap<(String, String), OpenApiDocument>,
}

impl StaticApiDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(
        mut self,
        service_name: impl Into<String>,
        api_name: impl Into<String>,
        document: OpenApiDocument,
    ) -> Self {
        self.documents
            .insert((service_name.into(), api_name.into()), document);
        self
    }
}

#[async_trait]
impl ApiDocumentSource for StaticApiDocumentSource {
    async fn fetch_document(&self, target: &ApiTarget) -> Result<OpenApiDocument, ServiceError> {
        self.documents
            .get(&(target.service_name.clone(), target.api_name.clone()))
            .cloned()
            .ok_or_else(|| {
                ServiceError::DocumentUnavailable(format!(
                    "{}/{} is not indexed",
                    target.service_name, target.api_name
                ))
            })
    }
}
