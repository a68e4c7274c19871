use std::sync::Arc;

use crate::gateway::GradingGateway;
use crate::models::CallerIdentity;
use crate::recordings::RecordingArchive;

// app's shared state
pub struct AppState {
    pub gateway: GradingGateway,
    pub archive: Option<Arc<RecordingArchive>>, // None when recordings are not kept
    pub instance_host: String,                  // who we are to the scorer
}

impl AppState {
    pub fn new(gateway: GradingGateway, instance_host: impl Into<String>) -> Self {
        Self {
            gateway,
            archive: None,
            instance_host: instance_host.into(),
        }
    }

    pub fn with_archive(mut self, archive: Arc<RecordingArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn caller(&self, user_id: &str) -> CallerIdentity {
        CallerIdentity::new(self.instance_host.clone(), user_id)
    }
}
