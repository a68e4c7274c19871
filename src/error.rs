//! Error taxonomy for the gateway

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Remote scorer unreachable, or its body is not usable JSON
    #[error("Scoring service unavailable: {0}")]
    ScoringUnavailable(String),

    /// Remote scorer answered but reported a domain error
    #[error("Scoring service rejected the request: {0}")]
    ScoringRejected(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl GatewayError {
    /// Both scoring failures mean the submission could not be graded.
    pub fn is_scoring_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::ScoringUnavailable(_) | GatewayError::ScoringRejected(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ScoringRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::ScoringUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::ScoringUnavailable(_) => "scoring_unavailable",
            GatewayError::ScoringRejected(_) => "scoring_rejected",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Config(_) => "config",
            GatewayError::Database(_) => "database",
            GatewayError::Io(_) => "io",
            GatewayError::Encoding(_) => "encoding",
            GatewayError::Metrics(_) => "metrics",
        }
    }
}

// Malformed bodies are the caller's fault, same as any other invalid input
impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        GatewayError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let message = if self.is_scoring_failure() {
            format!("Could not grade this submission. {self}")
        } else {
            self.to_string()
        };
        let body = Json(serde_json::json!({
            "error": self.kind(),
            "message": message,
        }));
        (status, body).into_response()
    }
}
