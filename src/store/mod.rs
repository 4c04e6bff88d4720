//! Access to the relational store.
//!
//! [`TagStore`] is the seam between the pipeline and PostgreSQL. Every method
//! is a single auto-committed statement; there is no transaction spanning
//! more than one call.
//!
//! Uniqueness violations are reported as [`TaggerError::DuplicateKey`] so the
//! resolver and link writer can recover from them.
//!
//! [`TaggerError::DuplicateKey`]: crate::error::TaggerError::DuplicateKey

use crate::error::Result;
use crate::models::{Keyword, KeywordId, Story, StoryId, StoryKind};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgTagStore;

pub trait TagStore {
    /// Stories of `kind` with no row in the kind's link table, in random order.
    async fn fetch_untagged(&self, kind: StoryKind) -> Result<Vec<Story>>;

    /// Exact-text keyword lookup.
    async fn find_keyword(&self, keyword: &str) -> Result<Option<KeywordId>>;

    /// Insert a keyword; `DuplicateKey` if the text already exists.
    async fn insert_keyword(&self, keyword: &str) -> Result<KeywordId>;

    /// Keywords linked to more than `min_links` stories of `kind`.
    async fn common_keywords(&self, kind: StoryKind, min_links: i64) -> Result<Vec<Keyword>>;

    /// Insert a link row; `DuplicateKey` if the pair already exists.
    async fn insert_link(
        &self,
        kind: StoryKind,
        story_id: StoryId,
        keyword_id: KeywordId,
    ) -> Result<()>;
}
