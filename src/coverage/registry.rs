use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::calculators;
use super::correlator::CorrelatedTelemetry;
use super::operation_index::OperationIndex;
use super::{Assessment, CoverageCriterion, CoverageResult};

pub type CalculateFn =
    Arc<dyn Fn(&OperationIndex, &CorrelatedTelemetry) -> Assessment + Send + Sync>;

/// A calculator strategy tagged with the criterion it claims.
#[derive(Clone)]
pub struct Calculator {
    criterion: CoverageCriterion,
    calculate: CalculateFn,
}

impl Calculator {
    pub fn new<F>(criterion: CoverageCriterion, calculate: F) -> Self
    where
        F: Fn(&OperationIndex, &CorrelatedTelemetry) -> Assessment + Send + Sync + 'static,
    {
        Self {
            criterion,
            calculate: Arc::new(calculate),
        }
    }

    pub fn criterion(&self) -> CoverageCriterion {
        self.criterion
    }

    /// Run the strategy and stamp its own wall-clock duration on the result.
    pub fn run(&self, index: &OperationIndex, telemetry: &CorrelatedTelemetry) -> CoverageResult {
        let started = Instant::now();
        let assessment = (self.calculate)(index, telemetry);
        CoverageResult {
            criterion: self.criterion,
            coverage: assessment.coverage,
            duration_ms: started.elapsed().as_millis() as u64,
            diagnostic: assessment.diagnostic,
        }
    }
}

impl std::fmt::Debug for Calculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calculator")
            .field("criterion", &self.criterion)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("more than one calculator claims {0}")]
    Duplicate(CoverageCriterion),

    #[error("no calculator claims {0}")]
    Missing(CoverageCriterion),
}

/// Exactly one calculator per criterion, checked once when the registry is
/// built.
#[derive(Debug, Clone)]
pub struct CalculatorRegistry {
    calculators: BTreeMap<CoverageCriterion, Calculator>,
}

impl CalculatorRegistry {
    pub fn new(calculators: impl IntoIterator<Item = Calculator>) -> Result<Self, RegistryError> {
        let mut by_criterion = BTreeMap::new();
        for calculator in calculators {
            let criterion = calculator.criterion();
            if by_criterion.insert(criterion, calculator).is_some() {
                return Err(RegistryError::Duplicate(criterion));
            }
        }
        if let Some(missing) = CoverageCriterion::ALL
            .iter()
            .find(|criterion| !by_criterion.contains_key(*criterion))
        {
            return Err(RegistryError::Missing(*missing));
        }
        Ok(Self {
            calculators: by_criterion,
        })
    }

    /// The production set of strategies.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::new([
            Calculator::new(CoverageCriterion::PathCoverage, calculators::path_coverage),
            Calculator::new(
                CoverageCriterion::ResponseCodeCoverage,
                calculators::response_code_coverage,
            ),
            Calculator::new(
                CoverageCriterion::ErrorResponseCodeCoverage,
                calculators::error_response_code_coverage,
            ),
            Calculator::new(
                CoverageCriterion::RequiredParameterCoverage,
                calculators::required_parameter_coverage,
            ),
            Calculator::new(
                CoverageCriterion::QueryParameterCoverage,
                calculators::query_parameter_coverage,
            ),
            Calculator::new(
                CoverageCriterion::HeaderParameterCoverage,
                calculators::header_parameter_coverage,
            ),
            Calculator::new(
                CoverageCriterion::ContentTypeCoverage,
                calculators::content_type_coverage,
            ),
            Calculator::new(
                CoverageCriterion::RequestBodySchemaCoverage,
                calculators::request_body_schema_coverage,
            ),
            Calculator::new(
                CoverageCriterion::HttpMethodCoverage,
                calculators::http_method_coverage,
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }

    pub fn get(&self, criterion: CoverageCriterion) -> Option<&Calculator> {
        self.calculators.get(&criterion)
    }

    pub fn calculators(&self) -> impl Iterator<Item = &Calculator> {
        self.calculators.values()
    }
}
