pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analysis::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/analysis/:subject_id",
            post(handlers::handle_analyze)
                .get(handlers::handle_get_analysis)
                .delete(handlers::handle_clear_analysis),
        )
        .with_state(state)
}
