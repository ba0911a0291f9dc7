pub mod db;
pub mod dispatch;
pub mod listener;
pub mod monitor;
pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::coverage::{Coverage, CoverageCriterion};

// ============================================================================
// Quality gate policy
// ============================================================================

/// Named policy selecting which criteria count toward pass/fail. Owned by the
/// external config service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateConfig {
    pub name: String,
    #[serde(default)]
    pub included_criteria: BTreeSet<String>,
}

impl QualityGateConfig {
    pub fn new<I, S>(name: impl Into<String>, included: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            included_criteria: included.into_iter().map(Into::into).collect(),
        }
    }

    pub fn includes(&self, criterion: CoverageCriterion) -> bool {
        self.included_criteria.contains(criterion.as_str())
    }
}

// ============================================================================
// Report aggregate
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    NotStarted,
    InProgress,
    Passed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::NotStarted => "NOT_STARTED",
            ReportStatus::InProgress => "IN_PROGRESS",
            ReportStatus::Passed => "PASSED",
            ReportStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Passed | ReportStatus::Failed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(ReportStatus::NotStarted),
            "IN_PROGRESS" => Ok(ReportStatus::InProgress),
            "PASSED" => Ok(ReportStatus::Passed),
            "FAILED" => Ok(ReportStatus::Failed),
            other => Err(format!("unknown report status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportParameters {
    pub lookback_secs: u64,
    #[serde(default)]
    pub attribute_filters: Vec<AttributeFilter>,
}

/// One (service, API, version) to certify. An absent version matches any
/// version reported back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTarget {
    pub service_name: String,
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTestResult {
    pub criterion: CoverageCriterion,
    pub coverage: Coverage,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub included_in_report: bool,
    pub recorded_at: DateTime<Utc>,
}

/// How a result for a criterion already present on an api test is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ResultMergePolicy {
    /// The later result for a criterion replaces the earlier one.
    #[default]
    Replace,
    /// Results pile up, duplicates included.
    Accumulate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTest {
    pub id: Uuid,
    pub service_name: String,
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub results: Vec<ApiTestResult>,
}

impl ApiTest {
    pub fn new(target: ApiTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_name: target.service_name,
            api_name: target.api_name,
            api_version: target.api_version,
            results: Vec::new(),
        }
    }

    pub fn target(&self) -> ApiTarget {
        ApiTarget {
            service_name: self.service_name.clone(),
            api_name: self.api_name.clone(),
            api_version: self.api_version.clone(),
        }
    }

    /// Exact service/api match; the version must match unless it was left
    /// unset at dispatch.
    pub fn matches(&self, service_name: &str, api_name: &str, api_version: Option<&str>) -> bool {
        self.service_name == service_name
            && self.api_name == api_name
            && match &self.api_version {
                None => true,
                Some(expected) => api_version == Some(expected.as_str()),
            }
    }

    pub fn attach(&mut self, results: Vec<ApiTestResult>, policy: ResultMergePolicy) {
        if policy == ResultMergePolicy::Replace {
            let incoming: BTreeSet<CoverageCriterion> =
                results.iter().map(|result| result.criterion).collect();
            self.results
                .retain(|existing| !incoming.contains(&existing.criterion));
        }
        self.results.extend(results);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateReport {
    pub calculation_id: Uuid,
    pub quality_gate_config_name: String,
    pub parameters: ReportParameters,
    pub api_tests: Vec<ApiTest>,
    pub report_status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why an incoming result could not be placed on exactly one api test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApiTestLookupError {
    #[error("no api test matches")]
    NoMatch,
    #[error("{0} api tests match equally")]
    Ambiguous(usize),
}

impl QualityGateReport {
    pub fn new(
        quality_gate_config_name: impl Into<String>,
        targets: Vec<ApiTarget>,
        parameters: ReportParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            calculation_id: Uuid::new_v4(),
            quality_gate_config_name: quality_gate_config_name.into(),
            parameters,
            api_tests: targets.into_iter().map(ApiTest::new).collect(),
            report_status: ReportStatus::NotStarted,
            created_at: now,
            updated_at: now,
        }
    }

    /// The api test owning an incoming result. A test pinned to the reported
    /// version wins over an unversioned one for the same service and API.
    /// Two candidates at the same level mean the result cannot be placed.
    pub fn find_api_test_mut(
        &mut self,
        service_name: &str,
        api_name: &str,
        api_version: Option<&str>,
    ) -> Result<&mut ApiTest, ApiTestLookupError> {
        let candidates: Vec<(usize, bool)> = self
            .api_tests
            .iter()
            .enumerate()
            .filter(|(_, test)| test.matches(service_name, api_name, api_version))
            .map(|(position, test)| (position, test.api_version.is_some()))
            .collect();

        let pinned: Vec<usize> = candidates.iter().filter(|(_, p)| *p).map(|(i, _)| *i).collect();
        let level = if pinned.is_empty() {
            candidates.iter().map(|(i, _)| *i).collect()
        } else {
            pinned
        };

        match level.as_slice() {
            [] => Err(ApiTestLookupError::NoMatch),
            [position] => self
                .api_tests
                .get_mut(*position)
                .ok_or(ApiTestLookupError::NoMatch),
            many => Err(ApiTestLookupError::Ambiguous(many.len())),
        }
    }
}
