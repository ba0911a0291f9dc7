//! One pure function per coverage criterion.
//!
//! Every calculator walks all operations of the index and checks them against
//! the telemetry correlated under the same operation key.

use std::collections::BTreeSet;

use super::correlator::{CorrelatedTelemetry, TelemetryRecord};
use super::operation_index::{Operation, OperationIndex, ParameterLocation, ResponseCode};
use super::{calculate_percentage, uncovered_diagnostic, Assessment, Coverage};

/// Method-agnostic: a resource path counts once any method on it saw traffic.
pub fn path_coverage(index: &OperationIndex, telemetry: &CorrelatedTelemetry) -> Assessment {
    let observed: BTreeSet<&str> = telemetry.keys().map(|key| key.resource_path()).collect();
    let documented = index.resource_paths();

    let uncovered: Vec<String> = documented
        .iter()
        .filter(|path| !observed.contains(*path))
        .map(|path| path.to_string())
        .collect();
    let covered = documented.len() - uncovered.len();

    Assessment::new(
        calculate_percentage(covered, documented.len()),
        uncovered_diagnostic("Uncovered paths", &uncovered),
    )
}

/// Method-sensitive sibling of [`path_coverage`].
pub fn http_method_coverage(index: &OperationIndex, telemetry: &CorrelatedTelemetry) -> Assessment {
    let uncovered: Vec<String> = index
        .keys()
        .filter(|key| !telemetry.has_records(key))
        .map(|key| key.to_string())
        .collect();
    let covered = index.len() - uncovered.len();

    Assessment::new(
        calculate_percentage(covered, index.len()),
        uncovered_diagnostic("Uncovered operations", &uncovered),
    )
}

fn observed_statuses(records: &[TelemetryRecord]) -> BTreeSet<u16> {
    records.iter().filter_map(TelemetryRecord::status_code).collect()
}

/// `default` stands for every status the operation does not document
/// explicitly, so it is covered by any such observed status.
fn default_covered(documented: &[ResponseCode], observed: &BTreeSet<u16>) -> bool {
    observed
        .iter()
        .any(|status| !documented.iter().any(|code| code.matches(*status)))
}

fn code_covered(code: &ResponseCode, documented: &[ResponseCode], observed: &BTreeSet<u16>) -> bool {
    match code {
        ResponseCode::Default => default_covered(documented, observed),
        other => observed.iter().any(|status| other.matches(*status)),
    }
}

pub fn response_code_coverage(index: &OperationIndex, telemetry: &CorrelatedTelemetry) -> Assessment {
    let mut required = 0usize;
    let mut uncovered = Vec::new();

    for operation in index.operations() {
        if operation.response_codes.is_empty() {
            continue;
        }
        let documented = operation.documented_responses();
        let observed = observed_statuses(telemetry.records(&operation.key));

        for (raw, code) in operation.response_codes.iter().zip(documented.iter()) {
            required += 1;
            if !code_covered(code, &documented, &observed) {
                uncovered.push(format!("{} [{}]", operation.key, raw));
            }
        }
    }

    Assessment::new(
        calculate_percentage(required - uncovered.len(), required),
        uncovered_diagnostic("Uncovered response codes", &uncovered),
    )
}

/// Only documented 4XX/5XX codes count. `default` is left out of the
/// denominator and listed as ignored. When `default` was the only error
/// response on offer the score is 0.00; with nothing error-like documented
/// at all the usual vacuous pass applies.
pub fn error_response_code_coverage(
    index: &OperationIndex,
    telemetry: &CorrelatedTelemetry,
) -> Assessment {
    let mut required = 0usize;
    let mut uncovered = Vec::new();
    let mut ignored = Vec::new();

    for operation in index.operations() {
        let documented = operation.documented_responses();
        let observed = observed_statuses(telemetry.records(&operation.key));

        for (raw, code) in operation.response_codes.iter().zip(documented.iter()) {
            if *code == ResponseCode::Default {
                ignored.push(format!("{} [{}]", operation.key, raw));
                continue;
            }
            if !code.is_error() {
                continue;
            }
            required += 1;
            if !observed.iter().any(|status| code.matches(*status)) {
                uncovered.push(format!("{} [{}]", operation.key, raw));
            }
        }
    }

    let mut notes = Vec::new();
    let coverage = if required == 0 && !ignored.is_empty() {
        notes.push("No documented error response codes".to_string());
        Coverage::ZERO
    } else {
        calculate_percentage(required - uncovered.len(), required)
    };
    if let Some(line) = uncovered_diagnostic("Uncovered error response codes", &uncovered) {
        notes.push(line);
    }
    if let Some(line) = uncovered_diagnostic("Ignored", &ignored) {
        notes.push(line);
    }

    Assessment::new(coverage, join_notes(notes))
}

fn parameter_label(operation: &Operation, name: &str, location: ParameterLocation) -> String {
    let location = match location {
        ParameterLocation::Query => "query",
        ParameterLocation::Header => "header",
        ParameterLocation::Path => "path",
        ParameterLocation::Cookie => "cookie",
    };
    format!("{} [{}:{}]", operation.key, location, name)
}

/// Presence of required parameters cannot be read from the captured span
/// attributes yet, so every required parameter is reported uncovered.
pub fn required_parameter_coverage(
    index: &OperationIndex,
    _telemetry: &CorrelatedTelemetry,
) -> Assessment {
    let required: Vec<String> = index
        .operations()
        .flat_map(|operation| {
            operation
                .parameters
                .iter()
                .filter(|p| p.required)
                .map(move |p| parameter_label(operation, &p.name, p.location))
        })
        .collect();

    let diagnostic = if required.is_empty() {
        None
    } else {
        Some(format!(
            "Not yet supported: required parameter presence is not captured in telemetry; uncovered: {}",
            required.join(", ")
        ))
    };
    Assessment::new(calculate_percentage(0, required.len()), diagnostic)
}

pub fn query_parameter_coverage(index: &OperationIndex, telemetry: &CorrelatedTelemetry) -> Assessment {
    let mut required = 0usize;
    let mut uncovered = Vec::new();

    for operation in index.operations() {
        let queries: Vec<String> = telemetry
            .records(&operation.key)
            .iter()
            .filter_map(TelemetryRecord::query_string)
            .collect();

        for parameter in operation
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Query && !p.required)
        {
            required += 1;
            let needle = format!("{}=", parameter.name);
            if !queries.iter().any(|query| query.contains(&needle)) {
                uncovered.push(parameter_label(operation, &parameter.name, parameter.location));
            }
        }
    }

    Assessment::new(
        calculate_percentage(required - uncovered.len(), required),
        uncovered_diagnostic("Uncovered query parameters", &uncovered),
    )
}

/// A lower bound: instrumentation may not capture every header.
pub fn header_parameter_coverage(index: &OperationIndex, telemetry: &CorrelatedTelemetry) -> Assessment {
    let mut required = 0usize;
    let mut uncovered = Vec::new();

    for operation in index.operations() {
        let records = telemetry.records(&operation.key);
        for parameter in operation
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Header)
        {
            required += 1;
            if !records.iter().any(|r| r.has_request_header(&parameter.name)) {
                uncovered.push(parameter_label(operation, &parameter.name, parameter.location));
            }
        }
    }

    let diagnostic = uncovered_diagnostic("Uncovered header parameters", &uncovered).map(|line| {
        format!(
            "{} (headers not captured by tracing instrumentation also appear here)",
            line
        )
    });
    Assessment::new(calculate_percentage(required - uncovered.len(), required), diagnostic)
}

/// A declared type is covered when an observed content type starts with it,
/// so `application/json; charset=utf-8` covers `application/json`.
pub fn content_type_coverage(index: &OperationIndex, telemetry: &CorrelatedTelemetry) -> Assessment {
    let mut required = 0usize;
    let mut uncovered = Vec::new();

    for operation in index.operations() {
        let observed: Vec<String> = telemetry
            .records(&operation.key)
            .iter()
            .flat_map(TelemetryRecord::content_types)
            .map(|value| value.trim().to_ascii_lowercase())
            .collect();

        for declared in operation.declared_content_types() {
            required += 1;
            let declared_lower = declared.to_ascii_lowercase();
            if !observed.iter().any(|value| value.starts_with(&declared_lower)) {
                uncovered.push(format!("{} [{}]", operation.key, declared));
            }
        }
    }

    Assessment::new(
        calculate_percentage(required - uncovered.len(), required),
        uncovered_diagnostic("Uncovered content types", &uncovered),
    )
}

/// Span attributes carry no body content, so this always reports 0.00 with
/// an explanation instead of a guessed number.
pub fn request_body_schema_coverage(
    index: &OperationIndex,
    _telemetry: &CorrelatedTelemetry,
) -> Assessment {
    let declared: usize = index
        .operations()
        .map(|operation| operation.required_body_properties.len())
        .sum();
    Assessment::new(
        Coverage::ZERO,
        Some(format!(
            "Not supported: tracing attributes do not carry request bodies; {} required body properties left unchecked",
            declared
        )),
    )
}

fn join_notes(notes: Vec<String>) -> Option<String> {
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}
