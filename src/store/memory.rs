//! In-memory [`TagStore`] for tests.
//!
//! Enforces the same uniqueness rules as the real schema and can be told to
//! lose an insert race or to fail lookups for particular keywords.

use super::TagStore;
use crate::error::{Result, TaggerError};
use crate::models::{Keyword, KeywordId, Story, StoryId, StoryKind};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    stories: HashMap<StoryKind, Vec<Story>>,
    keywords: Vec<Keyword>,
    links: BTreeSet<(StoryKind, StoryId, KeywordId)>,
    race_on_insert: HashSet<String>,
    broken: HashSet<String>,
    link_attempts: usize,
}

impl State {
    fn push_keyword(&mut self, text: &str) -> KeywordId {
        let id = self.keywords.len() as KeywordId + 1;
        self.keywords.push(Keyword {
            keyword_id: id,
            keyword: text.to_string(),
        });
        id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stories(self, kind: StoryKind, stories: Vec<Story>) -> Self {
        self.state.lock().unwrap().stories.insert(kind, stories);
        self
    }

    /// Next insert of `text` finds that another writer inserted it first.
    pub fn race_on_insert(&self, text: &str) {
        self.state.lock().unwrap().race_on_insert.insert(text.to_string());
    }

    /// Every query touching `text` fails as if the connection dropped.
    pub fn break_keyword(&self, text: &str) {
        self.state.lock().unwrap().broken.insert(text.to_string());
    }

    pub fn seed_keyword(&self, text: &str) -> KeywordId {
        self.state.lock().unwrap().push_keyword(text)
    }

    pub fn seed_link(&self, kind: StoryKind, story_id: StoryId, keyword_id: KeywordId) {
        self.state.lock().unwrap().links.insert((kind, story_id, keyword_id));
    }

    pub fn keywords(&self) -> Vec<Keyword> {
        self.state.lock().unwrap().keywords.clone()
    }

    pub fn links(&self, kind: StoryKind) -> Vec<(StoryId, KeywordId)> {
        self.state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, s, kw)| (*s, *kw))
            .collect()
    }

    pub fn link_attempts(&self) -> usize {
        self.state.lock().unwrap().link_attempts
    }
}

fn connection_lost() -> TaggerError {
    TaggerError::Store(sqlx::Error::PoolTimedOut)
}

impl TagStore for MemoryStore {
    async fn fetch_untagged(&self, kind: StoryKind) -> Result<Vec<Story>> {
        let state = self.state.lock().unwrap();
        let linked: HashSet<StoryId> = state
            .links
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, s, _)| *s)
            .collect();
        Ok(state
            .stories
            .get(&kind)
            .map(|all| all.iter().filter(|s| !linked.contains(&s.id)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_keyword(&self, keyword: &str) -> Result<Option<KeywordId>> {
        let state = self.state.lock().unwrap();
        if state.broken.contains(keyword) {
            return Err(connection_lost());
        }
        Ok(state
            .keywords
            .iter()
            .find(|k| k.keyword == keyword)
            .map(|k| k.keyword_id))
    }

    async fn insert_keyword(&self, keyword: &str) -> Result<KeywordId> {
        let mut state = self.state.lock().unwrap();
        if state.broken.contains(keyword) {
            return Err(connection_lost());
        }
        if state.race_on_insert.remove(keyword) {
            state.push_keyword(keyword);
        }
        if state.keywords.iter().any(|k| k.keyword == keyword) {
            return Err(TaggerError::DuplicateKey {
                what: format!("keyword {keyword:?}"),
            });
        }
        Ok(state.push_keyword(keyword))
    }

    async fn common_keywords(&self, kind: StoryKind, min_links: i64) -> Result<Vec<Keyword>> {
        let state = self.state.lock().unwrap();
        let mut counts: HashMap<KeywordId, i64> = HashMap::new();
        for (_, _, kw) in state.links.iter().filter(|(k, _, _)| *k == kind) {
            *counts.entry(*kw).or_default() += 1;
        }
        Ok(state
            .keywords
            .iter()
            .filter(|k| counts.get(&k.keyword_id).copied().unwrap_or(0) > min_links)
            .cloned()
            .collect())
    }

    async fn insert_link(
        &self,
        kind: StoryKind,
        story_id: StoryId,
        keyword_id: KeywordId,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.link_attempts += 1;
        if state.links.insert((kind, story_id, keyword_id)) {
            Ok(())
        } else {
            Err(TaggerError::DuplicateKey {
                what: format!("{} ({story_id}, {keyword_id})", kind.link_table()),
            })
        }
    }
}
