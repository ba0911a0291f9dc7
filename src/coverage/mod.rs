pub mod calculators;
pub mod coordinator;
pub mod correlator;
pub mod operation_index;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Criteria
// ============================================================================

/// Tag identifying one coverage calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageCriterion {
    PathCoverage,
    ResponseCodeCoverage,
    ErrorResponseCodeCoverage,
    RequiredParameterCoverage,
    QueryParameterCoverage,
    HeaderParameterCoverage,
    ContentTypeCoverage,
    RequestBodySchemaCoverage,
    HttpMethodCoverage,
}

impl CoverageCriterion {
    pub const ALL: [CoverageCriterion; 9] = [
        CoverageCriterion::PathCoverage,
        CoverageCriterion::ResponseCodeCoverage,
        CoverageCriterion::ErrorResponseCodeCoverage,
        CoverageCriterion::RequiredParameterCoverage,
        CoverageCriterion::QueryParameterCoverage,
        CoverageCriterion::HeaderParameterCoverage,
        CoverageCriterion::ContentTypeCoverage,
        CoverageCriterion::RequestBodySchemaCoverage,
        CoverageCriterion::HttpMethodCoverage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageCriterion::PathCoverage => "PATH_COVERAGE",
            CoverageCriterion::ResponseCodeCoverage => "RESPONSE_CODE_COVERAGE",
            CoverageCriterion::ErrorResponseCodeCoverage => "ERROR_RESPONSE_CODE_COVERAGE",
            CoverageCriterion::RequiredParameterCoverage => "REQUIRED_PARAMETER_COVERAGE",
            CoverageCriterion::QueryParameterCoverage => "QUERY_PARAMETER_COVERAGE",
            CoverageCriterion::HeaderParameterCoverage => "HEADER_PARAMETER_COVERAGE",
            CoverageCriterion::ContentTypeCoverage => "CONTENT_TYPE_COVERAGE",
            CoverageCriterion::RequestBodySchemaCoverage => "REQUEST_BODY_SCHEMA_COVERAGE",
            CoverageCriterion::HttpMethodCoverage => "HTTP_METHOD_COVERAGE",
        }
    }
}

impl fmt::Display for CoverageCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverageCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoverageCriterion::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown coverage criterion '{}'", s))
    }
}

// ============================================================================
// Coverage value
// ============================================================================

/// A coverage ratio in [0, 1] held as whole hundredths, so equality with
/// 1.00 is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Coverage(u16);

impl Coverage {
    pub const ZERO: Coverage = Coverage(0);
    pub const FULL: Coverage = Coverage(100);

    pub fn from_hundredths(hundredths: u16) -> Self {
        Coverage(hundredths.min(100))
    }

    pub fn hundredths(&self) -> u16 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.0) / 100.0
    }

    pub fn is_full(&self) -> bool {
        self.0 == 100
    }
}

impl From<Coverage> for f64 {
    fn from(value: Coverage) -> Self {
        value.as_f64()
    }
}

impl TryFrom<f64> for Coverage {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(format!("coverage {} is outside [0, 1]", value));
        }
        // Rounded from the shortest decimal form so 0.285 lands on 0.29.
        let text = value.abs().to_string();
        let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
        let digit = |i: usize| {
            fraction
                .as_bytes()
                .get(i)
                .map_or(0, |b| u16::from(b.saturating_sub(b'0')))
        };
        let whole: u16 = whole
            .parse()
            .map_err(|_| format!("coverage {} is not a decimal", value))?;
        let mut hundredths = whole * 100 + digit(0) * 10 + digit(1);
        if digit(2) >= 5 {
            hundredths += 1;
        }
        Ok(Coverage::from_hundredths(hundredths))
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Shared percentage rule for every calculator.
///
/// Nothing declared is a vacuous pass (1.00); nothing covered is 0.00;
/// otherwise `covered / required` rounded half-up to two decimals.
pub fn calculate_percentage(covered: usize, required: usize) -> Coverage {
    if required == 0 {
        return Coverage::FULL;
    }
    if covered == 0 {
        return Coverage::ZERO;
    }
    let covered = covered.min(required) as u128;
    let required = required as u128;
    let hundredths = (covered * 200 + required) / (required * 2);
    Coverage::from_hundredths(hundredths as u16)
}

// ============================================================================
// Results
// ============================================================================

/// What a single calculator concludes, before the registry stamps the
/// criterion and timing on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub coverage: Coverage,
    pub diagnostic: Option<String>,
}

impl Assessment {
    pub fn new(coverage: Coverage, diagnostic: Option<String>) -> Self {
        Self {
            coverage,
            diagnostic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageResult {
    pub criterion: CoverageCriterion,
    pub coverage: Coverage,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Join a list of uncovered items into a diagnostic, or `None` when
/// everything is covered.
pub(crate) fn uncovered_diagnostic(label: &str, items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(format!("{}: {}", label, items.join(", ")))
    }
}
