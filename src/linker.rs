//! Idempotent story-to-keyword links.

use crate::error::Result;
use crate::models::{KeywordId, StoryId, StoryKind};
use crate::store::TagStore;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Inserted,
    /// The pair was already linked; nothing was written.
    Duplicate,
}

pub struct LinkWriter<'a, S> {
    store: &'a S,
}

impl<'a, S: TagStore> LinkWriter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Link `story_id` to `keyword_id` in the kind's link table.
    ///
    /// An existing link is reported as [`LinkOutcome::Duplicate`], never as an
    /// error. Each call commits on its own.
    pub async fn link(
        &self,
        kind: StoryKind,
        story_id: StoryId,
        keyword_id: KeywordId,
    ) -> Result<LinkOutcome> {
        match self.store.insert_link(kind, story_id, keyword_id).await {
            Ok(()) => Ok(LinkOutcome::Inserted),
            Err(e) if e.is_duplicate() => {
                debug!(%kind, story_id, keyword_id, "Duplicate link was not inserted");
                Ok(LinkOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }
}
