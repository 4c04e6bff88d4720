//! Maps topic strings to durable keyword ids.
//!
//! Resolution order:
//! 1. exact match on the keyword text
//! 2. (optional) reuse of a common keyword that is similar enough
//! 3. insert, recovering from a lost insert race by re-reading
//!
//! One resolver is built per story kind per run. It owns the common-keyword
//! snapshot it merges against, so nothing is shared between kinds or runs.

use crate::error::{Result, TaggerError};
use crate::models::{Keyword, KeywordId, StoryKind};
use crate::similarity::TextSimilarity;
use crate::store::TagStore;
use tracing::{debug, info, instrument, warn};

/// How a topic ended up with its keyword id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The keyword text already existed.
    Existing,
    /// A new keyword row was inserted.
    Created,
    /// Another writer inserted the same text first; its row was reused.
    Recovered,
    /// Folded into a similar common keyword.
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub keyword_id: KeywordId,
    pub origin: Origin,
}

/// Similarity-based merge settings.
struct Merge<'a> {
    similarity: &'a dyn TextSimilarity,
    threshold: f64,
    common: Vec<Keyword>,
}

pub struct KeywordResolver<'a, S> {
    store: &'a S,
    merge: Option<Merge<'a>>,
}

impl<'a, S: TagStore> KeywordResolver<'a, S> {
    /// Resolver without similarity merging.
    pub fn new(store: &'a S) -> Self {
        Self { store, merge: None }
    }

    /// Enable merging into the given common keywords.
    pub fn with_merge(
        mut self,
        similarity: &'a dyn TextSimilarity,
        threshold: f64,
        common: Vec<Keyword>,
    ) -> Self {
        self.merge = Some(Merge {
            similarity,
            threshold,
            common,
        });
        self
    }

    /// Enable merging, loading the common keywords of `kind` from the store.
    ///
    /// If they cannot be loaded the resolver carries on without merging.
    #[instrument(level = "info", skip(self, similarity))]
    pub async fn with_common_keywords(
        self,
        kind: StoryKind,
        similarity: &'a dyn TextSimilarity,
        threshold: f64,
        min_links: i64,
    ) -> Self {
        match self.store.common_keywords(kind, min_links).await {
            Ok(common) => {
                info!(count = common.len(), "Loaded common keywords for merging");
                self.with_merge(similarity, threshold, common)
            }
            Err(e) => {
                warn!(error = %e, "Could not load common keywords; merging disabled");
                self
            }
        }
    }

    /// Resolve one topic. Errors only concern this topic.
    pub async fn resolve(&self, topic: &str) -> Result<Resolved> {
        self.try_resolve(topic)
            .await
            .map_err(|source| TaggerError::KeywordResolution {
                topic: topic.to_string(),
                source: Box::new(source),
            })
    }

    async fn try_resolve(&self, topic: &str) -> Result<Resolved> {
        if let Some(keyword_id) = self.store.find_keyword(topic).await? {
            return Ok(Resolved {
                keyword_id,
                origin: Origin::Existing,
            });
        }

        if let Some(common) = self.similar_common(topic) {
            debug!(topic, merged_into = %common.keyword, "Merged topic into common keyword");
            return Ok(Resolved {
                keyword_id: common.keyword_id,
                origin: Origin::Merged,
            });
        }

        match self.store.insert_keyword(topic).await {
            Ok(keyword_id) => Ok(Resolved {
                keyword_id,
                origin: Origin::Created,
            }),
            Err(e) if e.is_duplicate() => {
                debug!(topic, "Keyword inserted concurrently; re-reading");
                match self.store.find_keyword(topic).await? {
                    Some(keyword_id) => Ok(Resolved {
                        keyword_id,
                        origin: Origin::Recovered,
                    }),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Best common keyword scoring at or above the threshold.
    fn similar_common(&self, topic: &str) -> Option<&Keyword> {
        let merge = self.merge.as_ref()?;
        merge
            .common
            .iter()
            .filter_map(|k| {
                let score = merge.similarity.similarity(topic, &k.keyword)?;
                (score.is_finite() && score >= merge.threshold).then_some((k, score))
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(k, _)| k)
    }
}
