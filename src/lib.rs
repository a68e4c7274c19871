pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod grading;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod recordings;
pub mod scorer;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

pub use error::{GatewayError, Result};
pub use gateway::{GradingGateway, ScoreOutcome};
pub use state::AppState;

// Router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/score", post(handlers::score_handler))
        .route("/api/grade", post(handlers::grade_handler))
        .with_state(state)
}
