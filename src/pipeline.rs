//! The tagging run: fetch, batch, request, parse, stage, resolve and link.
//!
//! Each kind is processed on its own:
//!
//! ```text
//! FETCH ─(nothing pending)──────────────────────────────────────────► DONE
//!   │
//!   ▼
//! BATCH ─► REQUEST ─► PARSE ─► CSV_STAGE ─► RESOLVE_AND_LINK ─┐
//!            ▲   │(service error: skip batch)                 │
//!            └───┴────────────────── next batch ◄─────────────┘
//! ```
//!
//! Batches run strictly one after another. A failed request skips only its
//! batch, and a failed topic skips only its link. Only the first assignment
//! for a story id is linked in a kind's run, so a story never gains more than
//! one link per topic slot.

use crate::api::TopicSource;
use crate::batcher::batches;
use crate::config::TaggerConfig;
use crate::error::Result;
use crate::linker::{LinkOutcome, LinkWriter};
use crate::models::{Story, StoryId, StoryKind, TopicAssignment};
use crate::outputs::ArtifactSink;
use crate::parser::parse_report;
use crate::resolver::{KeywordResolver, Origin};
use crate::similarity::TextSimilarity;
use crate::store::TagStore;
use itertools::Itertools;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Counters for one kind's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSummary {
    pub stories: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub assignments: usize,
    pub skipped_fragments: usize,
    /// Assignments whose id was not part of the batch that produced them.
    pub foreign_assignments: usize,
    /// Assignments dropped because their story was already linked this run.
    pub repeated_assignments: usize,
    pub keywords_created: usize,
    pub keywords_merged: usize,
    pub links_inserted: usize,
    pub duplicate_links: usize,
    pub failed_topics: usize,
}

pub struct TaggingPipeline<'a, S, C> {
    store: &'a S,
    source: &'a C,
    config: &'a TaggerConfig,
    similarity: Option<&'a dyn TextSimilarity>,
    artifacts: Option<ArtifactSink>,
}

impl<'a, S: TagStore, C: TopicSource> TaggingPipeline<'a, S, C> {
    pub fn new(store: &'a S, source: &'a C, config: &'a TaggerConfig) -> Self {
        Self {
            store,
            source,
            config,
            similarity: None,
            artifacts: None,
        }
    }

    /// Similarity provider used when `config.merge_similar` is on.
    pub fn with_similarity(mut self, similarity: &'a dyn TextSimilarity) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_artifacts(mut self, sink: ArtifactSink) -> Self {
        self.artifacts = Some(sink);
        self
    }

    /// Tag every kind in order. A kind whose fetch fails is logged and skipped.
    pub async fn run(&mut self, kinds: &[StoryKind]) -> Vec<(StoryKind, KindSummary)> {
        let mut summaries = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            match self.run_kind(kind).await {
                Ok(summary) => summaries.push((kind, summary)),
                Err(e) => {
                    error!(%kind, error = %e, "Could not fetch untagged stories; skipping kind")
                }
            }
        }
        summaries
    }

    /// Tag all pending stories of one kind.
    ///
    /// Only the initial fetch can fail; later problems are counted in the
    /// returned summary.
    #[instrument(level = "info", skip(self))]
    pub async fn run_kind(&mut self, kind: StoryKind) -> Result<KindSummary> {
        let start = Instant::now();
        let mut summary = KindSummary::default();

        // FETCH
        let stories = self.store.fetch_untagged(kind).await?;
        summary.stories = stories.len();
        if stories.is_empty() {
            info!("No untagged stories; nothing to do");
            return Ok(summary);
        }
        info!(count = stories.len(), "Fetched untagged stories");

        let resolver = self.resolver_for(kind).await;
        let writer = LinkWriter::new(self.store);
        let mut linked = HashSet::new();

        // BATCH
        for (index, batch) in batches(stories, self.config.batch_size).enumerate() {
            summary.batches += 1;
            let ctx = LinkContext {
                resolver: &resolver,
                writer: &writer,
                linked: &mut linked,
            };
            self.process_batch(kind, index, &batch, ctx, &mut summary).await;
            info!(
                batch = index,
                elapsed_secs = %format!("{:.2}", start.elapsed().as_secs_f64()),
                "Batch done"
            );
        }

        info!(
            stories = summary.stories,
            batches = summary.batches,
            failed_batches = summary.failed_batches,
            assignments = summary.assignments,
            skipped_fragments = summary.skipped_fragments,
            foreign_assignments = summary.foreign_assignments,
            repeated_assignments = summary.repeated_assignments,
            keywords_created = summary.keywords_created,
            keywords_merged = summary.keywords_merged,
            links_inserted = summary.links_inserted,
            duplicate_links = summary.duplicate_links,
            failed_topics = summary.failed_topics,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Kind complete"
        );
        Ok(summary)
    }

    async fn resolver_for(&self, kind: StoryKind) -> KeywordResolver<'a, S> {
        let resolver = KeywordResolver::new(self.store);
        match (self.config.merge_similar, self.similarity) {
            (true, Some(similarity)) => {
                resolver
                    .with_common_keywords(
                        kind,
                        similarity,
                        self.config.similarity_threshold,
                        self.config.common_keyword_min_links,
                    )
                    .await
            }
            (true, None) => {
                warn!("merge_similar is set but no similarity provider was given");
                resolver
            }
            _ => resolver,
        }
    }

    async fn process_batch(
        &mut self,
        kind: StoryKind,
        index: usize,
        batch: &[Story],
        mut ctx: LinkContext<'_, 'a, S>,
        summary: &mut KindSummary,
    ) {
        let t0 = Instant::now();

        // REQUEST
        info!(batch = index, size = batch.len(), "Requesting topics");
        let raw = match self.source.request_topics(batch).await {
            Ok(raw) => raw,
            Err(e) => {
                summary.failed_batches += 1;
                warn!(
                    batch = index,
                    status = e.status_code(),
                    error = %e,
                    "Completion request failed; skipping batch"
                );
                return;
            }
        };
        if let Some(sink) = self.artifacts.as_mut() {
            if let Err(e) = sink.record_response(kind, &raw).await {
                warn!(error = %e, "Failed to write response dump");
            }
        }

        // PARSE
        let report = parse_report(&raw);
        summary.assignments += report.assignments.len();
        summary.skipped_fragments += report.skipped;
        info!(
            batch = index,
            assignments = report.assignments.len(),
            skipped = report.skipped,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Parsed completion"
        );

        // CSV_STAGE
        if let Some(sink) = self.artifacts.as_ref() {
            if let Err(e) = sink.record_assignments(kind, &report.assignments).await {
                warn!(error = %e, "Failed to stage topics CSV");
            }
        }

        // RESOLVE_AND_LINK
        let ids: HashSet<StoryId> = batch.iter().map(|s| s.id).collect();
        for assignment in &report.assignments {
            let story_id = assignment.story_id;
            if !ctx.linked.insert(story_id) {
                summary.repeated_assignments += 1;
                warn!(story_id, "Story already tagged in this run; ignoring repeated assignment");
                continue;
            }
            if !ids.contains(&story_id) {
                summary.foreign_assignments += 1;
                debug!(story_id, "Assignment for a story outside this batch");
            }
            link_assignment(kind, assignment, ctx.resolver, ctx.writer, summary).await;
        }
    }
}

/// Per-kind state shared by every batch's link step.
struct LinkContext<'r, 'a, S> {
    resolver: &'r KeywordResolver<'a, S>,
    writer: &'r LinkWriter<'a, S>,
    /// Story ids that already had an assignment linked in this run.
    linked: &'r mut HashSet<StoryId>,
}

async fn link_assignment<S: TagStore>(
    kind: StoryKind,
    assignment: &TopicAssignment,
    resolver: &KeywordResolver<'_, S>,
    writer: &LinkWriter<'_, S>,
    summary: &mut KindSummary,
) {
    let story_id = assignment.story_id;
    for topic in assignment.topics.iter().unique() {
        let resolved = match resolver.resolve(topic).await {
            Ok(resolved) => resolved,
            Err(e) => {
                summary.failed_topics += 1;
                warn!(story_id, error = %e, "Skipping topic");
                continue;
            }
        };
        match resolved.origin {
            Origin::Created => summary.keywords_created += 1,
            Origin::Merged => summary.keywords_merged += 1,
            Origin::Existing | Origin::Recovered => {}
        }

        match writer.link(kind, story_id, resolved.keyword_id).await {
            Ok(LinkOutcome::Inserted) => summary.links_inserted += 1,
            Ok(LinkOutcome::Duplicate) => summary.duplicate_links += 1,
            Err(e) => {
                summary.failed_topics += 1;
                warn!(
                    story_id,
                    keyword_id = resolved.keyword_id,
                    error = %e,
                    "Failed to link story"
                );
            }
        }
    }
}
