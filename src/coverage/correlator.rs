use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::operation_index::OperationKey;

// Attribute names read from tracing spans. The first entry of each list is the
// current semantic-convention name; the rest are older spellings still emitted
// by some instrumentations.
pub const METHOD_ATTRIBUTES: &[&str] = &["http.request.method", "http.method"];
pub const PATH_ATTRIBUTES: &[&str] = &["url.path", "http.target"];
pub const STATUS_CODE_ATTRIBUTES: &[&str] = &["http.response.status_code", "http.status_code"];
pub const QUERY_ATTRIBUTES: &[&str] = &["url.query", "http.query"];
pub const CONTENT_TYPE_ATTRIBUTES: &[&str] = &[
    "http.request.header.content-type",
    "http.response.header.content-type",
    "http.content_type",
];
pub const REQUEST_HEADER_PREFIX: &str = "http.request.header.";

/// One observed request/response, as read from the tracing store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub span_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl TelemetryRecord {
    pub fn new(span_id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: trace_id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute value rendered as text; numbers and booleans are stringified.
    pub fn attribute(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn first_attribute(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.attribute(key))
    }

    pub fn method(&self) -> Option<String> {
        self.first_attribute(METHOD_ATTRIBUTES)
    }

    pub fn path(&self) -> Option<String> {
        self.first_attribute(PATH_ATTRIBUTES)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.first_attribute(STATUS_CODE_ATTRIBUTES)
            .and_then(|raw| raw.trim().parse().ok())
    }

    pub fn query_string(&self) -> Option<String> {
        self.first_attribute(QUERY_ATTRIBUTES)
    }

    pub fn content_types(&self) -> Vec<String> {
        CONTENT_TYPE_ATTRIBUTES
            .iter()
            .filter_map(|key| self.attribute(key))
            .collect()
    }

    /// Whether a request header was captured. Instrumentation records headers
    /// under lowercased names.
    pub fn has_request_header(&self, name: &str) -> bool {
        let key = format!("{}{}", REQUEST_HEADER_PREFIX, name.to_ascii_lowercase());
        self.attributes.contains_key(&key)
    }

    pub fn operation_key(&self) -> Option<OperationKey> {
        match (self.method(), self.path()) {
            (Some(method), Some(path)) => Some(OperationKey::new(&method, &path)),
            _ => None,
        }
    }
}

/// Telemetry grouped by the same operation-key scheme as the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelatedTelemetry {
    by_operation: BTreeMap<OperationKey, Vec<TelemetryRecord>>,
}

impl CorrelatedTelemetry {
    pub fn is_empty(&self) -> bool {
        self.by_operation.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_operation.len()
    }

    pub fn records(&self, key: &OperationKey) -> &[TelemetryRecord] {
        self.by_operation
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_records(&self, key: &OperationKey) -> bool {
        !self.records(key).is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &OperationKey> {
        self.by_operation.keys()
    }

    pub fn record_count(&self) -> usize {
        self.by_operation.values().map(Vec::len).sum()
    }
}

/// Group a telemetry batch by operation key. Records missing the method or
/// the path cannot form a key and are dropped.
pub fn correlate(records: impl IntoIterator<Item = TelemetryRecord>) -> CorrelatedTelemetry {
    let mut by_operation: BTreeMap<OperationKey, Vec<TelemetryRecord>> = BTreeMap::new();
    let mut dropped = 0usize;
    for record in records {
        match record.operation_key() {
            Some(key) => by_operation.entry(key).or_default().push(record),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::debug!("Dropped {} telemetry records without method/path", dropped);
    }
    CorrelatedTelemetry { by_operation }
}
