use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::gateway::GradingGateway;
use crate::models::{
    CallerIdentity, GradedState, GradingContext, GradingMode, GradingRequest, Question,
    ScoreRequest, ScoringResult, ScoringTarget,
};

// One recording's score inside a graded attempt
#[derive(Debug, Clone)]
pub struct ScoredRecording {
    pub cache_key: String,
    pub cached: bool,
    pub result: ScoringResult,
}

#[derive(Debug, Clone)]
pub struct GradedAttempt {
    pub fraction: f64,
    pub state: GradedState,
    pub recordings: Vec<ScoredRecording>,
}

pub fn decode_audio(audio_base64: &str) -> Result<Vec<u8>> {
    let audio = STANDARD
        .decode(audio_base64.trim())
        .map_err(|e| GatewayError::InvalidRequest(format!("audio is not valid base64: {e}")))?;
    if audio.is_empty() {
        return Err(GatewayError::InvalidRequest("audio is empty".to_string()));
    }
    Ok(audio)
}

/// Grading request for one recording of `question`.
///
/// Scripted and pronunciation questions need a non-empty speech phrase.
pub fn request_for_question(question: &Question, audio: &[u8]) -> Result<GradingRequest> {
    let audio_base64 = STANDARD.encode(audio);
    let request = match question.mode {
        GradingMode::Scripted | GradingMode::Pronunciation => {
            let phrase = question
                .speech_phrase
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    GatewayError::InvalidRequest(format!(
                        "question {} has no speech phrase for {} grading",
                        question.id, question.mode
                    ))
                })?;
            GradingRequest::scripted(phrase, audio_base64)
        }
        GradingMode::Unscripted => {
            let context = GradingContext::new(
                question.context_question.as_deref(),
                question.context_description.as_deref(),
                question.context_valid_answer_description.as_deref(),
            );
            GradingRequest::unscripted(context, audio_base64)
        }
    };
    Ok(request)
}

/// Validate a direct scoring submission. Returns the request to score and the
/// decoded audio.
pub fn request_from_submission(submission: &ScoreRequest) -> Result<(GradingRequest, Vec<u8>)> {
    let audio = decode_audio(&submission.audio_base64)?;
    let context = submission.context.as_ref().and_then(GradingContext::normalized);

    let request = if submission.mode.requires_expected_text() {
        let Some(expected_text) = &submission.expected_text else {
            return Err(GatewayError::InvalidRequest(format!(
                "expected_text is required for {} grading",
                submission.mode
            )));
        };
        if context.is_some() {
            return Err(GatewayError::InvalidRequest(format!(
                "context is only accepted for unscripted grading, not {}",
                submission.mode
            )));
        }
        GradingRequest::scripted(expected_text.clone(), submission.audio_base64.trim())
    } else {
        if submission.expected_text.is_some() {
            return Err(GatewayError::InvalidRequest(
                "expected_text must be absent for unscripted grading".to_string(),
            ));
        }
        GradingRequest::unscripted(context, submission.audio_base64.trim())
    };
    Ok((request, audio))
}

/// Score every recording of an attempt and combine them into one grade.
///
/// Pronunciation answers contribute `overall_score / 100`, the others their
/// overall mock IELTS band `/ 10`. The grade is the mean, clamped to 0..=1.
/// A single failed recording fails the whole attempt.
pub async fn grade_recordings(
    gateway: &GradingGateway,
    question: &Question,
    caller: CallerIdentity,
    recordings: &[Vec<u8>],
) -> Result<GradedAttempt> {
    if recordings.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "at least one recording is required".to_string(),
        ));
    }

    let target = ScoringTarget {
        mode: question.mode,
        accent: question.accent.clone(),
        caller,
    };

    // build every request first so an unusable question never reaches the scorer
    let requests = recordings
        .iter()
        .map(|audio| request_for_question(question, audio))
        .collect::<Result<Vec<_>>>()?;

    let mut scored = Vec::with_capacity(requests.len());
    for request in &requests {
        let outcome = gateway.score_audio(&target, request).await?;
        let result = ScoringResult::from_value(question.mode, &outcome.result)?;
        scored.push(ScoredRecording {
            cache_key: outcome.cache_key,
            cached: outcome.cached,
            result,
        });
    }

    let total: f64 = scored.iter().map(|r| r.result.fraction()).sum();
    let fraction = (total / scored.len() as f64).clamp(0.0, 1.0);
    let state = GradedState::for_fraction(fraction);

    info!(
        question = question.id,
        recordings = scored.len(),
        fraction,
        ?state,
        "graded attempt"
    );

    Ok(GradedAttempt {
        fraction,
        state,
        recordings: scored,
    })
}
