//! Data models for stories, topic assignments, keywords and the completion API.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Story`]: An untagged record read from the store
//! - [`StoryKind`]: Which source/link table pair a story belongs to
//! - [`TopicAssignment`]: Three topics the model assigned to one story
//! - [`Keyword`]: A stored keyword row
//! - Completion wire types: [`ChatCompletionRequest`], [`ChatCompletionResponse`]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a story or Reddit article row.
pub type StoryId = i32;

/// Identifier of a row in the `keywords` table.
pub type KeywordId = i32;

/// Placeholder topic used to fill empty topic slots.
pub const UNTAGGED: &str = "UNTAGGED";

/// Number of topic slots per story.
pub const TOPIC_SLOTS: usize = 3;

/// A story awaiting topic classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Story {
    pub id: StoryId,
    pub title: String,
}

#[cfg(test)]
impl Story {
    pub fn new(id: StoryId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// The two families of stories that get tagged.
///
/// Each kind names its own source table and link table; the SQL layer and the
/// artifact writer read those names from here instead of duplicating logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum StoryKind {
    /// News articles from the RSS feeds.
    Media,
    /// Reddit posts.
    Reddit,
}

impl StoryKind {
    /// Order in which a full run processes the kinds.
    pub const ALL: [StoryKind; 2] = [StoryKind::Reddit, StoryKind::Media];

    pub fn source_table(self) -> &'static str {
        match self {
            StoryKind::Media => "stories",
            StoryKind::Reddit => "reddit_article",
        }
    }

    pub fn id_column(self) -> &'static str {
        match self {
            StoryKind::Media => "story_id",
            StoryKind::Reddit => "re_article_id",
        }
    }

    pub fn title_column(self) -> &'static str {
        match self {
            StoryKind::Media => "title",
            StoryKind::Reddit => "re_title",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            StoryKind::Media => "story_keyword_link",
            StoryKind::Reddit => "reddit_keyword_link",
        }
    }

    /// Label used in artifact file names.
    pub fn label(self) -> &'static str {
        match self {
            StoryKind::Media => "public",
            StoryKind::Reddit => "reddit",
        }
    }
}

impl fmt::Display for StoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Topics the completion service assigned to one story.
///
/// Always holds exactly [`TOPIC_SLOTS`] topics; missing ones are [`UNTAGGED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicAssignment {
    pub story_id: StoryId,
    pub topics: [String; TOPIC_SLOTS],
}

impl TopicAssignment {
    /// Build an assignment from however many topics the model produced.
    ///
    /// Only the first three are read. Blank topics and empty slots become
    /// [`UNTAGGED`].
    pub fn from_topics<I, T>(story_id: StoryId, topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut slots: [String; TOPIC_SLOTS] = std::array::from_fn(|_| UNTAGGED.to_string());
        for (slot, topic) in slots.iter_mut().zip(topics) {
            let topic = topic.as_ref().trim();
            if !topic.is_empty() {
                *slot = topic.to_string();
            }
        }
        Self { story_id, topics: slots }
    }
}

/// A keyword row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Keyword {
    pub keyword_id: KeywordId,
    pub keyword: String,
}

/// Request body for the chat completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Response from the chat completions endpoint. Only `choices` is read.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}
