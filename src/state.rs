use std::sync::Arc;
use std::time::Duration;

use crate::report::db::ReportDb;
use crate::report::dispatch::DispatchOrchestrator;

pub type SharedState = Arc<AppState>;

/// What the HTTP handlers need. Built once in `main` with every collaborator
/// already injected.
pub struct AppState {
    pub db: Arc<ReportDb>,
    pub dispatcher: DispatchOrchestrator,
    pub default_lookback_secs: u64,
    pub stale_report_after: Duration,
}

impl AppState {
    pub fn new(
        db: Arc<ReportDb>,
        dispatcher: DispatchOrchestrator,
        default_lookback_secs: u64,
        stale_report_after: Duration,
    ) -> Self {
        Self {
            db,
            dispatcher,
            default_lookback_secs,
            stale_report_after,
        }
    }
}
