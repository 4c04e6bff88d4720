//! PostgreSQL implementation of [`TagStore`].

use super::TagStore;
use crate::error::{Result, TaggerError};
use crate::models::{Keyword, KeywordId, Story, StoryId, StoryKind};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// The pipeline issues one statement at a time.
const MAX_CONNECTIONS: u32 = 2;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PgTagStore {
    pool: PgPool,
}

impl PgTagStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database. Failure here is fatal for the run.
    #[instrument(level = "info", skip_all)]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let start = Instant::now();
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(database_url)
            .await?;

        info!(
            pool_size = pool.size(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Database connection pool established"
        );
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map a unique-constraint violation to `DuplicateKey`, anything else to `Store`.
fn classify(err: sqlx::Error, what: impl FnOnce() -> String) -> TaggerError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            TaggerError::DuplicateKey { what: what() }
        }
        _ => TaggerError::Store(err),
    }
}

fn untagged_sql(kind: StoryKind) -> String {
    let (src, id, title, link) = (
        kind.source_table(),
        kind.id_column(),
        kind.title_column(),
        kind.link_table(),
    );
    format!(
        "SELECT s.{id} AS id, s.{title} AS title FROM {src} s \
         LEFT JOIN {link} l ON s.{id} = l.{id} \
         WHERE l.{id} IS NULL ORDER BY RANDOM()"
    )
}

fn common_keywords_sql(kind: StoryKind) -> String {
    let link = kind.link_table();
    format!(
        "SELECT k.keyword_id, k.keyword FROM keywords k \
         JOIN {link} l ON k.keyword_id = l.keyword_id \
         GROUP BY k.keyword_id, k.keyword \
         HAVING COUNT(l.keyword_id) > $1"
    )
}

fn insert_link_sql(kind: StoryKind) -> String {
    format!(
        "INSERT INTO {} ({}, keyword_id) VALUES ($1, $2)",
        kind.link_table(),
        kind.id_column()
    )
}

impl TagStore for PgTagStore {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_untagged(&self, kind: StoryKind) -> Result<Vec<Story>> {
        let stories = sqlx::query_as::<_, Story>(&untagged_sql(kind))
            .fetch_all(&self.pool)
            .await?;
        debug!(count = stories.len(), "Fetched untagged stories");
        Ok(stories)
    }

    async fn find_keyword(&self, keyword: &str) -> Result<Option<KeywordId>> {
        let id = sqlx::query_scalar::<_, KeywordId>(
            "SELECT keyword_id FROM keywords WHERE keyword = $1",
        )
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert_keyword(&self, keyword: &str) -> Result<KeywordId> {
        sqlx::query_scalar::<_, KeywordId>(
            "INSERT INTO keywords (keyword) VALUES ($1) RETURNING keyword_id",
        )
        .bind(keyword)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("keyword {keyword:?}")))
    }

    #[instrument(level = "debug", skip(self))]
    async fn common_keywords(&self, kind: StoryKind, min_links: i64) -> Result<Vec<Keyword>> {
        let keywords = sqlx::query_as::<_, Keyword>(&common_keywords_sql(kind))
            .bind(min_links)
            .fetch_all(&self.pool)
            .await?;
        Ok(keywords)
    }

    async fn insert_link(
        &self,
        kind: StoryKind,
        story_id: StoryId,
        keyword_id: KeywordId,
    ) -> Result<()> {
        sqlx::query(&insert_link_sql(kind))
            .bind(story_id)
            .bind(keyword_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                classify(e, || {
                    format!("{} ({story_id}, {keyword_id})", kind.link_table())
                })
            })?;
        Ok(())
    }
}
