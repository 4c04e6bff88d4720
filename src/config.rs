//! Tagger settings loaded from an optional YAML file.
//!
//! Every field has a default, so an absent or partial file is fine. CLI flags
//! are applied on top with [`TaggerConfig::apply_cli`].

use crate::cli::Cli;
use crate::error::{Result, TaggerError};
use crate::similarity::DEFAULT_SIMILARITY_THRESHOLD;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Prompt sent ahead of each batch; the batch is appended as a JSON array.
pub const DEFAULT_PROMPT: &str = r#"Generate three words for each story's main topics.
For example, the headline 'Sunak questioned by Police Service of Northern Ireland for vandalism' should return the topics "Politics, Crime, Law", while the headline 'Royal family requests giant pandas to return to China in December' should return "Animals, China, Monarchy".
You must return only one word for each topic. Make sure topics are broad to allow grouping stories by topic easier, for example, if Queen Elizabeth or Prince Harry are mentioned in the story, one of the three output topics should be 'Monarchy', or an output topic may be 'Crime' if the story is about theft. Good topics include but are not limited to: Monarchy, Relationships, Football, War, Shopping, Crime, Law, Politics, Education, Scandal, Finance, Climate, Government, Accident.
The output for each story MUST be a dictionary where the key is the id provided with the story and the value is a list of the topics (do not return the title under any circumstances). Here's an example output for two stories: [{3: ['Weather', 'History', 'Technology']}, {4: ['Health', 'Science', 'Celebrity']}]. Output a list of dictionaries for these stories: "#;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaggerConfig {
    /// Base URL of the OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Per-request timeout; expiry counts as a service error.
    pub timeout_secs: u64,
    /// Stories per completion request.
    pub batch_size: usize,
    /// Extra attempts for transient completion failures.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    /// Reuse a common keyword when a new topic is similar enough to it.
    pub merge_similar: bool,
    pub similarity_threshold: f64,
    /// A keyword is common when it has more links than this.
    pub common_keyword_min_links: i64,
    pub prompt: String,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: 2,
            retry_base_delay_ms: 1_000,
            merge_similar: false,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            common_keyword_min_links: 5,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl TaggerConfig {
    /// Read a YAML config file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        let config = Self::from_yaml(&text)?;
        info!("Loaded configuration file");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Let command-line flags win over file values.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(size) = cli.batch_size {
            self.batch_size = size;
        }
        if cli.merge_similar {
            self.merge_similar = true;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TaggerError::Config("batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(TaggerError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TaggerError::Config(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.timeout_secs == 0 {
            return Err(TaggerError::Config("timeout_secs must be positive".into()));
        }
        if self.model.trim().is_empty() || self.base_url.trim().is_empty() {
            return Err(TaggerError::Config("model and base_url are required".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
