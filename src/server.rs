use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Calculations
        .route(
            "/quality-gates/{name}/calculations",
            post(crate::routes::reports::start_calculation),
        )
        // Reports
        .route("/reports/stale", get(crate::routes::reports::stale_reports))
        .route(
            "/reports/{calculation_id}",
            get(crate::routes::reports::get_report),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
