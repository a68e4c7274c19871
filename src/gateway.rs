//! Grading cache gateway
//!
//! One remote scoring call per distinct grading request. A miss calls the
//! scorer, keeps the raw body when it looks like a score and hands back the
//! parsed JSON; a hit replays the newest stored body. Failures are never stored,
//! so the next identical request tries the scorer again.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CachedResult, ResultStore, make_cache_key};
use crate::error::{GatewayError, Result};
use crate::metrics::{CACHE_HITS, CACHE_MISSES, REMOTE_FAILURES};
use crate::models::{GradingRequest, ScoringTarget};
use crate::scorer::ScoringClient;

const GENERIC_FAILURE: &str = "Failed to get the score";

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub cache_key: String,
    pub cached: bool,
    pub result: Value,
}

#[derive(Clone)]
pub struct GradingGateway {
    store: Arc<dyn ResultStore>,
    client: Arc<dyn ScoringClient>,
}

impl GradingGateway {
    pub fn new(store: Arc<dyn ResultStore>, client: Arc<dyn ScoringClient>) -> Self {
        Self { store, client }
    }

    pub async fn score_audio(
        &self,
        target: &ScoringTarget,
        request: &GradingRequest,
    ) -> Result<ScoreOutcome> {
        let cache_key = make_cache_key(request)?;

        // check cache first
        if let Some(entry) = self.store.find_latest(&cache_key).await? {
            match serde_json::from_str::<Value>(&entry.raw_response) {
                Ok(result) if !result.is_null() => {
                    CACHE_HITS.inc();
                    info!(%cache_key, mode = %target.mode, "cache hit");
                    return Ok(ScoreOutcome {
                        cache_key,
                        cached: true,
                        result,
                    });
                }
                _ => warn!(%cache_key, "stored response is not valid JSON, scoring again"),
            }
        }
        CACHE_MISSES.inc();
        info!(%cache_key, mode = %target.mode, accent = %target.accent, "cache miss, calling scorer");

        let raw = self
            .client
            .submit(target, request)
            .await
            .inspect_err(|_| REMOTE_FAILURES.inc())?;
        let result = interpret_response(&raw).inspect_err(|e| {
            REMOTE_FAILURES.inc();
            warn!(%cache_key, error = %e, "scoring failed");
        })?;

        self.store
            .insert(CachedResult::new(cache_key.clone(), raw))
            .await?;

        Ok(ScoreOutcome {
            cache_key,
            cached: false,
            result,
        })
    }
}

/// Decide whether a raw scorer body is a score.
///
/// Success is an object with `overall` or `overall_score`. A body that is not
/// JSON, or decodes to nothing (null, false, 0, "", empty array/object), means
/// the service was unavailable. Anything else is a rejection, carrying the
/// service's `detail` when it sent one.
pub fn interpret_response(raw: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(raw).map_err(|e| {
        GatewayError::ScoringUnavailable(format!("Can not get response from API ({e})"))
    })?;

    if is_empty_value(&parsed) {
        return Err(GatewayError::ScoringUnavailable(
            "Can not get response from API".to_string(),
        ));
    }

    let Value::Object(fields) = &parsed else {
        return Err(GatewayError::ScoringRejected(GENERIC_FAILURE.to_string()));
    };
    if fields.contains_key("overall") || fields.contains_key("overall_score") {
        return Ok(parsed);
    }

    let detail = match fields.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(other) => other.to_string(),
        None => GENERIC_FAILURE.to_string(),
    };
    Err(GatewayError::ScoringRejected(detail))
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}
