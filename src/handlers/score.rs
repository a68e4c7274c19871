use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::grading::request_from_submission;
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{ScoreRequest, ScoreResponse, ScoringTarget};
use crate::state::AppState;

// Score one recording through the cache
pub async fn score_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>> {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();
    let Json(payload) = payload?;

    let (request, audio) = request_from_submission(&payload)?;
    let target = ScoringTarget {
        mode: payload.mode,
        accent: payload.accent.clone(),
        caller: state.caller(&payload.user_id),
    };

    let outcome = state.gateway.score_audio(&target, &request).await?;
    super::archive_recording(state.archive.as_deref(), &outcome.cache_key, &audio).await;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    Ok(Json(ScoreResponse {
        cache_key: outcome.cache_key,
        cached: outcome.cached,
        result: outcome.result,
    }))
}
