use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::correlator::CorrelatedTelemetry;
use super::operation_index::OperationIndex;
use super::registry::CalculatorRegistry;
use super::{CoverageCriterion, CoverageResult};

/// Results of one coordinator pass, one entry per criterion.
pub type CoverageResults = BTreeMap<CoverageCriterion, CoverageResult>;

/// Runs every registered calculator against one correlated pair.
#[derive(Debug, Clone)]
pub struct CoverageCoordinator {
    registry: Arc<CalculatorRegistry>,
}

impl CoverageCoordinator {
    pub fn new(registry: Arc<CalculatorRegistry>) -> Self {
        Self { registry }
    }

    /// Returns an empty set without invoking any calculator when there is
    /// nothing documented or nothing observed.
    pub fn calculate(
        &self,
        index: &OperationIndex,
        telemetry: &CorrelatedTelemetry,
    ) -> CoverageResults {
        if index.is_empty() || telemetry.is_empty() {
            debug!(
                "Skipping coverage: {} operations, {} observed operation keys",
                index.len(),
                telemetry.len()
            );
            return CoverageResults::new();
        }

        self.registry
            .calculators()
            .map(|calculator| {
                let result = calculator.run(index, telemetry);
                debug!(
                    "{} = {} in {}ms",
                    result.criterion, result.coverage, result.duration_ms
                );
                (result.criterion, result)
            })
            .collect()
    }
}
