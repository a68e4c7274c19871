mod grade;
mod health;
mod metrics;
mod score;

pub use grade::grade_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use score::score_handler;

use tracing::warn;

use crate::recordings::RecordingArchive;

// Keeping a recording is best effort, grading never fails because of it.
// Only recordings of successfully scored requests are kept.
async fn archive_recording(archive: Option<&RecordingArchive>, cache_key: &str, audio: &[u8]) {
    if let Some(archive) = archive {
        if let Err(e) = archive.store(cache_key, audio).await {
            warn!(%cache_key, error = %e, "failed to keep recording");
        }
    }
}
