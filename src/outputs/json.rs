//! JSON dump of raw completion responses.

use crate::error::Result;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

/// Overwrite `path` with `responses` as a pretty-printed JSON array.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), count = responses.len()))]
pub async fn write_responses(path: &Path, responses: &[String]) -> Result<()> {
    let json = serde_json::to_vec_pretty(responses)?;
    fs::write(path, json).await?;
    debug!("Wrote response dump");
    Ok(())
}
