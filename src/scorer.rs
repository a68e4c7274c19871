use async_trait::async_trait;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::models::{Accent, GradingMode, GradingRequest, ScoringTarget};

pub const API_KEY_HEADER: &str = "x-blobr-key";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const INSTANCE_HOST_HEADER: &str = "lc-custom-moodle-instance-hostname";
pub const BETA_FEATURES_HEADER: &str = "lc-beta-features";

/// Transport to the remote scorer. Returns the raw response body;
/// deciding whether that body is a success is the gateway's job.
#[async_trait]
pub trait ScoringClient: Send + Sync {
    async fn submit(&self, target: &ScoringTarget, request: &GradingRequest) -> Result<String>;
}

// Base URL per grading mode
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub scripted: Option<String>,
    pub unscripted: Option<String>,
    pub pronunciation: Option<String>,
}

impl Endpoints {
    pub fn url_for(&self, mode: GradingMode, accent: &Accent) -> Result<String> {
        let base = match mode {
            GradingMode::Scripted => self.scripted.as_deref(),
            GradingMode::Unscripted => self.unscripted.as_deref(),
            GradingMode::Pronunciation => self.pronunciation.as_deref(),
        }
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| GatewayError::Config(format!("no scoring URL configured for {mode}")))?;

        Ok(format!("{}/{}", base.trim_end_matches('/'), accent))
    }
}

pub struct HttpScoringClient {
    client: reqwest::Client,
    endpoints: Endpoints,
    api_key: String,
    beta_features: bool,
}

impl HttpScoringClient {
    pub fn new(
        client: reqwest::Client,
        endpoints: Endpoints,
        api_key: impl Into<String>,
        beta_features: bool,
    ) -> Self {
        Self {
            client,
            endpoints,
            api_key: api_key.into(),
            beta_features,
        }
    }
}

#[async_trait]
impl ScoringClient for HttpScoringClient {
    async fn submit(&self, target: &ScoringTarget, request: &GradingRequest) -> Result<String> {
        let url = self.endpoints.url_for(target.mode, &target.accent)?;

        // .json() also sets Content-Type: application/json
        let mut builder = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(USER_ID_HEADER, target.caller.caller_id())
            .header(INSTANCE_HOST_HEADER, &target.caller.host)
            .json(request);
        if self.beta_features {
            builder = builder.header(BETA_FEATURES_HEADER, "true");
        }

        let res = builder.send().await.map_err(|e| {
            GatewayError::ScoringUnavailable(format!("request to {url} failed: {e}"))
        })?;
        let status = res.status();
        let body = res.text().await.map_err(|e| {
            GatewayError::ScoringUnavailable(format!("reading response from {url} failed: {e}"))
        })?;

        debug!(%url, %status, bytes = body.len(), "scoring service responded");
        Ok(body)
    }
}
