use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::feedback::render_feedback;
use crate::grading::{decode_audio, grade_recordings};
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{GradeRequest, GradeResponse};
use crate::state::AppState;

// Grade every recording of a question attempt and render its feedback
pub async fn grade_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GradeRequest>, JsonRejection>,
) -> Result<Json<GradeResponse>> {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();
    let Json(payload) = payload?;

    let recordings = payload
        .recordings
        .iter()
        .map(|audio| decode_audio(audio))
        .collect::<Result<Vec<_>>>()?;

    let attempt = grade_recordings(
        &state.gateway,
        &payload.question,
        state.caller(&payload.user_id),
        &recordings,
    )
    .await?;

    for (scored, audio) in attempt.recordings.iter().zip(&recordings) {
        super::archive_recording(state.archive.as_deref(), &scored.cache_key, audio).await;
    }

    let results: Vec<_> = attempt.recordings.into_iter().map(|r| r.result).collect();
    let feedback_html = render_feedback(payload.question.id, &results);

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    Ok(Json(GradeResponse {
        fraction: attempt.fraction,
        state: attempt.state,
        feedback_html,
    }))
}
