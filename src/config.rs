use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::scorer::Endpoints;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "speech-grading-gateway")]
#[command(about = "Caching gateway in front of a remote speech-scoring service")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "SPEECH_GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    // Key sent to the scoring service, required
    #[arg(long, env = "SPEECH_GATEWAY_API_KEY", hide_env_values = true)]
    pub api_key: String,

    // Scoring endpoint per grading mode, accent is appended as "/{accent}"
    #[arg(long, env = "SPEECH_GATEWAY_SCRIPTED_URL")]
    pub scripted_url: Option<String>,

    #[arg(long, env = "SPEECH_GATEWAY_UNSCRIPTED_URL")]
    pub unscripted_url: Option<String>,

    #[arg(long, env = "SPEECH_GATEWAY_PRONUNCIATION_URL")]
    pub pronunciation_url: Option<String>,

    // Host identity forwarded to the scorer (also prefixes the caller id)
    #[arg(long, env = "SPEECH_GATEWAY_INSTANCE_HOST", default_value = "localhost")]
    pub instance_host: String,

    // Ask the scorer for beta features
    #[arg(long, env = "SPEECH_GATEWAY_BETA_FEATURES")]
    pub beta_features: bool,

    // SQLite file holding cached scorer responses
    #[arg(long, env = "SPEECH_GATEWAY_DATABASE", default_value = "speech-gateway.db")]
    pub database: PathBuf,

    // Keep submitted recordings here (disabled when unset)
    #[arg(long, env = "SPEECH_GATEWAY_AUDIO_DIR")]
    pub audio_dir: Option<PathBuf>,

    // Delete kept recordings older than this many days, 0 keeps them forever
    #[arg(long, env = "SPEECH_GATEWAY_RETENTION_DAYS", default_value_t = 15)]
    pub retention_days: u64,

    // Seconds between retention sweeps
    #[arg(long, env = "SPEECH_GATEWAY_CLEANUP_INTERVAL", default_value_t = 60)]
    pub cleanup_interval: u64,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(GatewayError::Config(
                "an API key for the scoring service must be set (--api-key)".to_string(),
            ));
        }
        if self.instance_host.trim().is_empty() {
            return Err(GatewayError::Config("instance host must not be empty".to_string()));
        }
        if self.cleanup_interval == 0 {
            return Err(GatewayError::Config("cleanup interval must be positive".to_string()));
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            scripted: self.scripted_url.clone(),
            unscripted: self.unscripted_url.clone(),
            pronunciation: self.pronunciation_url.clone(),
        }
    }

    pub fn retention(&self) -> Option<Duration> {
        (self.retention_days > 0)
            .then(|| Duration::from_secs(self.retention_days.saturating_mul(SECONDS_PER_DAY)))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }
}
