use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Parsed OpenAPI document (the subset the engine reads)
// ============================================================================

/// An already-parsed OpenAPI document as handed over by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openapi: Option<String>,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    /// Parameters shared by every operation under this path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<OpenApiOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<OpenApiOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<OpenApiOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<OpenApiOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<OpenApiOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<OpenApiOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OpenApiOperation>,
}

impl PathItem {
    pub fn operation(&self, method: HttpMethod) -> Option<&OpenApiOperation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiOperation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub responses: BTreeMap<String, ApiResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Header,
    Path,
    Cookie,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Operation keys
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// Join key between documented operations and observed traffic.
///
/// The path is compared literally: `/users/42` never matches `/users/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey {
    method: String,
    path: String,
}

impl OperationKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.trim().to_ascii_uppercase(),
            path: path.to_string(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The operation key with its method stripped.
    pub fn resource_path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.method, self.path)
    }
}

// ============================================================================
// Indexed operations
// ============================================================================

/// A documented response code key as written in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResponseCode {
    Exact(u16),
    /// `NXX` pattern, holding the leading digit.
    Range(u8),
    Default,
    Unrecognized(String),
}

impl ResponseCode {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("default") {
            return ResponseCode::Default;
        }
        let bytes = raw.as_bytes();
        if bytes.len() == 3
            && bytes[0].is_ascii_digit()
            && bytes[1].eq_ignore_ascii_case(&b'x')
            && bytes[2].eq_ignore_ascii_case(&b'x')
        {
            return ResponseCode::Range(bytes[0] - b'0');
        }
        match raw.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => ResponseCode::Exact(code),
            _ => ResponseCode::Unrecognized(raw.to_string()),
        }
    }

    /// Leading digit of the code, if it has one.
    pub fn class(&self) -> Option<u8> {
        match self {
            ResponseCode::Exact(code) => Some((code / 100) as u8),
            ResponseCode::Range(digit) => Some(*digit),
            ResponseCode::Default | ResponseCode::Unrecognized(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.class(), Some(4) | Some(5))
    }

    /// Whether an observed status satisfies this code. `default` is resolved
    /// by the caller because it depends on the sibling codes.
    pub fn matches(&self, status: u16) -> bool {
        match self {
            ResponseCode::Exact(code) => *code == status,
            ResponseCode::Range(digit) => status / 100 == u16::from(*digit),
            ResponseCode::Default | ResponseCode::Unrecognized(_) => false,
        }
    }
}

/// One documented endpoint, flattened for the calculators.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub key: OperationKey,
    pub parameters: Vec<Parameter>,
    /// Response code keys exactly as documented (`200`, `4XX`, `default`).
    pub response_codes: BTreeSet<String>,
    pub request_content_types: BTreeSet<String>,
    pub response_content_types: BTreeSet<String>,
    pub required_body_properties: BTreeSet<String>,
}

impl Operation {
    fn from_document(
        key: OperationKey,
        shared_parameters: &[Parameter],
        operation: &OpenApiOperation,
    ) -> Self {
        // Operation-level parameters override path-level ones with the same
        // name and location.
        let mut parameters: Vec<Parameter> = shared_parameters
            .iter()
            .filter(|shared| {
                !operation
                    .parameters
                    .iter()
                    .any(|p| p.name == shared.name && p.location == shared.location)
            })
            .cloned()
            .collect();
        parameters.extend(operation.parameters.iter().cloned());

        let mut request_content_types = BTreeSet::new();
        let mut required_body_properties = BTreeSet::new();
        if let Some(body) = &operation.request_body {
            for (content_type, media) in &body.content {
                request_content_types.insert(content_type.clone());
                if let Some(schema) = &media.schema {
                    required_body_properties.extend(schema.required.iter().cloned());
                }
            }
        }

        let response_content_types = operation
            .responses
            .values()
            .flat_map(|response| response.content.keys().cloned())
            .collect();

        Self {
            key,
            parameters,
            response_codes: operation.responses.keys().cloned().collect(),
            request_content_types,
            response_content_types,
            required_body_properties,
        }
    }

    pub fn documented_responses(&self) -> Vec<ResponseCode> {
        self.response_codes
            .iter()
            .map(|raw| ResponseCode::parse(raw))
            .collect()
    }

    pub fn declared_content_types(&self) -> BTreeSet<&str> {
        self.request_content_types
            .iter()
            .chain(self.response_content_types.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Every documented operation of one API, keyed by operation key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationIndex {
    operations: BTreeMap<OperationKey, Operation>,
}

impl OperationIndex {
    /// Flatten a document into its operations. A missing document yields an
    /// empty index rather than an error.
    pub fn build(document: Option<&OpenApiDocument>) -> Self {
        let Some(document) = document else {
            return Self::default();
        };

        let mut operations = BTreeMap::new();
        for (path, item) in &document.paths {
            for method in HttpMethod::ALL {
                if let Some(operation) = item.operation(method) {
                    let key = OperationKey::new(method.as_str(), path);
                    let indexed = Operation::from_document(key.clone(), &item.parameters, operation);
                    operations.insert(key, indexed);
                }
            }
        }
        Self { operations }
    }

    pub fn from_operations(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations
                .into_iter()
                .map(|operation| (operation.key.clone(), operation))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn get(&self, key: &OperationKey) -> Option<&Operation> {
        self.operations.get(key)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &OperationKey> {
        self.operations.keys()
    }

    pub fn resource_paths(&self) -> BTreeSet<&str> {
        self.operations.keys().map(OperationKey::resource_path).collect()
    }
}
