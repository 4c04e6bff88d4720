//! Command-line interface definitions for the story tagger.
//!
//! Secrets and connection strings can come from flags or environment
//! variables; tuning knobs live in the optional YAML config file and can be
//! overridden here.

use crate::models::StoryKind;
use clap::Parser;
use itertools::Itertools;

/// Command-line arguments for the story tagger.
///
/// # Examples
///
/// ```sh
/// # Tag everything pending, credentials from the environment
/// story_tagger
///
/// # Only Reddit posts, smaller batches, keep the raw responses and CSVs
/// story_tagger --kind reddit --batch-size 40 --artifacts-dir ./runs
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// API key for the completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory for raw response dumps and topic CSVs (disabled when absent)
    #[arg(short, long)]
    pub artifacts_dir: Option<String>,

    /// Stories per completion request (overrides the config file)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Merge new keywords into similar, frequently used ones
    #[arg(long)]
    pub merge_similar: bool,

    /// Story kinds to tag; defaults to reddit then media
    #[arg(short, long, value_enum)]
    pub kind: Vec<StoryKind>,
}

impl Cli {
    /// Kinds to process, in run order.
    pub fn kinds(&self) -> Vec<StoryKind> {
        if self.kind.is_empty() {
            StoryKind::ALL.to_vec()
        } else {
            self.kind.iter().copied().unique().collect()
        }
    }
}
