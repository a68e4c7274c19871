use crate::error::Result;

pub async fn metrics_handler() -> Result<String> {
    crate::metrics::render()
}
