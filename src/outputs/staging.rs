//! CSV staging of parsed topic assignments.

use crate::error::{Result, TaggerError};
use crate::models::{StoryKind, TopicAssignment};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Append `assignments` to the CSV at `path`, writing the header when the
/// file is new.
///
/// Columns: `<id column>,topic_one,topic_two,topic_three`.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), rows = assignments.len()))]
pub async fn append_assignments(
    path: &Path,
    kind: StoryKind,
    assignments: &[TopicAssignment],
) -> Result<()> {
    let is_new = !tokio::fs::try_exists(path).await?;
    let bytes = render(kind, assignments, is_new)?;

    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    debug!(is_new, "Appended topic rows");
    Ok(())
}

fn render(kind: StoryKind, assignments: &[TopicAssignment], header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if header {
        writer.write_record([kind.id_column(), "topic_one", "topic_two", "topic_three"])?;
    }
    for a in assignments {
        let id = a.story_id.to_string();
        writer.write_record([id.as_str(), &a.topics[0], &a.topics[1], &a.topics[2]])?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| TaggerError::Io(e.into_error()))
}
