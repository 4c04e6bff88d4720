//! Per-run debugging artifacts.
//!
//! Neither file is read back by the pipeline; they exist so a run can be
//! inspected or replayed by hand.
//!
//! ```text
//! artifacts_dir/
//! ├── reddit-2025-05-06T07-30-00.json   # every raw completion text of the run
//! ├── reddit-2025-05-06T07-30-00.csv    # re_article_id,topic_one,topic_two,topic_three
//! ├── public-2025-05-06T07-30-00.json
//! └── public-2025-05-06T07-30-00.csv
//! ```

pub mod json;
pub mod staging;

use crate::error::Result;
use crate::models::{StoryKind, TopicAssignment};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Writes the response dump and topic CSV for each kind.
#[derive(Debug)]
pub struct ArtifactSink {
    dir: PathBuf,
    stamp: String,
    responses: HashMap<StoryKind, Vec<String>>,
}

impl ArtifactSink {
    pub fn new(dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stamp: stamp.into(),
            responses: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: StoryKind, ext: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.{ext}", kind.label(), self.stamp))
    }

    /// Add one raw completion text to the kind's JSON dump and rewrite it.
    pub async fn record_response(&mut self, kind: StoryKind, raw: &str) -> Result<PathBuf> {
        let path = self.path(kind, "json");
        let responses = self.responses.entry(kind).or_default();
        responses.push(raw.to_string());
        json::write_responses(&path, responses).await?;
        Ok(path)
    }

    /// Append one batch's assignments to the kind's CSV.
    pub async fn record_assignments(
        &self,
        kind: StoryKind,
        assignments: &[TopicAssignment],
    ) -> Result<PathBuf> {
        let path = self.path(kind, "csv");
        staging::append_assignments(&path, kind, assignments).await?;
        Ok(path)
    }
}
