//! # Story Tagger
//!
//! Tags news articles and Reddit posts in the media-sentiment database with
//! three topic keywords each, using an OpenAI-compatible completion API.
//!
//! ## Usage
//!
//! ```sh
//! DATABASE_URL=postgres://... OPENAI_API_KEY=sk-... story_tagger --artifacts-dir ./runs
//! ```
//!
//! ## Architecture
//!
//! For each story kind (Reddit posts, then media articles):
//! 1. **Fetch**: Select stories with no keyword link yet
//! 2. **Batch**: Split them into batches of `batch_size`
//! 3. **Request**: Ask the completion service for three topics per story
//! 4. **Parse**: Pull `{id: [topics]}` fragments out of the answer
//! 5. **Resolve & link**: Map topics to keyword rows and link the stories
//!
//! A run that is interrupted can simply be started again: stories that
//! already have links are not fetched a second time.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod batcher;
mod cli;
mod config;
mod error;
mod linker;
mod models;
mod outputs;
mod parser;
mod pipeline;
mod resolver;
mod similarity;
mod store;
mod utils;

use api::{CompletionClient, RetryTopics};
use cli::Cli;
use config::TaggerConfig;
use outputs::ArtifactSink;
use pipeline::TaggingPipeline;
use similarity::LexicalSimilarity;
use store::PgTagStore;
use utils::{ensure_writable_dir, run_stamp};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("story_tagger starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.artifacts_dir, ?args.kind, "Parsed CLI arguments");

    // ---- Load & validate configuration ----
    let config = match &args.config {
        Some(path) => TaggerConfig::load(path).await?,
        None => TaggerConfig::default(),
    }
    .apply_cli(&args);
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    info!(
        model = %config.model,
        batch_size = config.batch_size,
        merge_similar = config.merge_similar,
        similarity_threshold = config.similarity_threshold,
        "Configuration ready"
    );

    // Early check: artifacts dir must be writable if requested
    let artifacts = match &args.artifacts_dir {
        Some(dir) => {
            let dir = Path::new(dir);
            if let Err(e) = ensure_writable_dir(dir).await {
                error!(
                    path = %dir.display(),
                    error = %e,
                    "Artifacts directory is not writable (fix perms or choose a different path)"
                );
                return Err(e);
            }
            Some(ArtifactSink::new(dir, run_stamp(Local::now())))
        }
        None => None,
    };

    // ---- Connect ----
    let store = match PgTagStore::connect(&args.database_url).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Could not connect to the database");
            return Err(e.into());
        }
    };

    let client = CompletionClient::new(&config, args.api_key.clone())?;
    let source = RetryTopics::new(client, config.max_retries, config.retry_base_delay());

    // ---- Tag ----
    let mut pipeline =
        TaggingPipeline::new(&store, &source, &config).with_similarity(&LexicalSimilarity);
    if let Some(sink) = artifacts {
        info!(path = %sink.dir().display(), "Writing run artifacts");
        pipeline = pipeline.with_artifacts(sink);
    }

    let summaries = pipeline.run(&args.kinds()).await;
    for (kind, summary) in &summaries {
        info!(
            %kind,
            stories = summary.stories,
            batches = summary.batches,
            failed_batches = summary.failed_batches,
            links_inserted = summary.links_inserted,
            repeated_assignments = summary.repeated_assignments,
            failed_topics = summary.failed_topics,
            "Kind summary"
        );
    }

    store.close().await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
