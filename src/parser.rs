//! Best-effort extraction of topic assignments from completion text.
//!
//! The model is asked for `[{12: ['Politics', 'Law', 'UK']}, ...]` but what
//! comes back is only loosely shaped like that. Each `{...}` fragment is
//! parsed on its own; fragments that are not `<int>: [<string>, ...]` are
//! dropped without failing the rest.

use crate::models::{StoryId, TopicAssignment};
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{(.*?)\}").expect("valid regex"));

/// Assignments found in one response plus how many fragments were dropped.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub assignments: Vec<TopicAssignment>,
    pub skipped: usize,
}

/// Parse a completion response into topic assignments, in encounter order.
///
/// Never fails; dropped fragments are only counted.
pub fn parse_report(raw: &str) -> ParseReport {
    let mut report = ParseReport::default();
    for capture in FRAGMENT.captures_iter(raw) {
        let body = &capture[1];
        match parse_fragment(body) {
            Some(assignment) => report.assignments.push(assignment),
            None => {
                report.skipped += 1;
                debug!(
                    fragment = %truncate_for_log(body, 120),
                    "Skipping malformed fragment"
                );
            }
        }
    }
    report
}

fn parse_fragment(body: &str) -> Option<TopicAssignment> {
    let (key, value) = body.split_once(':')?;
    let story_id = parse_story_id(key)?;
    let topics = parse_string_list(value)?;
    Some(TopicAssignment::from_topics(story_id, topics))
}

/// A positive integer, optionally wrapped in one pair of matching quotes.
fn parse_story_id(key: &str) -> Option<StoryId> {
    let key = key.trim();
    let key = ['"', '\'']
        .iter()
        .find_map(|q| key.strip_prefix(*q).and_then(|k| k.strip_suffix(*q)))
        .unwrap_or(key)
        .trim();
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<StoryId>().ok().filter(|id| *id > 0)
}

/// A `[...]` literal holding only quoted strings, trailing comma allowed.
fn parse_string_list(value: &str) -> Option<Vec<String>> {
    let inner = value.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut chars = inner.chars().peekable();
    let mut items = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => item.push(chars.next()?),
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNTAGGED;

    fn parse(raw: &str) -> Vec<TopicAssignment> {
        parse_report(raw).assignments
    }

    #[test]
    fn test_single_well_formed_fragment() {
        let out = parse(r#"[{12: ["Politics","Law","UK"]}]"#);
        assert_eq!(
            out,
            vec![TopicAssignment::from_topics(12, ["Politics", "Law", "UK"])]
        );
    }

    #[test]
    fn test_malformed_fragment_is_skipped() {
        let report = parse_report(r#"[{bad: notalist}, {7: ["Sport"]}]"#);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.assignments.len(), 1);
        assert_eq!(report.assignments[0].story_id, 7);
        assert_eq!(report.assignments[0].topics, ["Sport", UNTAGGED, UNTAGGED]);
    }

    #[test]
    fn test_python_style_quotes_and_order() {
        let raw = "Sure! [{3: ['Weather', 'History', 'Technology']}, \
                   {4: ['Health', 'Science', 'Celebrity']}]";
        let out = parse(raw);
        assert_eq!(out.iter().map(|a| a.story_id).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(out[1].topics, ["Health", "Science", "Celebrity"]);
    }

    #[test]
    fn test_quoted_numeric_key_accepted() {
        let out = parse(r#"{"15": ["Crime", "Law"]}"#);
        assert_eq!(out[0].story_id, 15);
        assert_eq!(out[0].topics, ["Crime", "Law", UNTAGGED]);
    }

    #[test]
    fn test_rejects_non_numeric_and_non_positive_ids() {
        assert!(parse(r#"{abc: ["A"]}"#).is_empty());
        assert!(parse(r#"{-3: ["A"]}"#).is_empty());
        assert!(parse(r#"{0: ["A"]}"#).is_empty());
        assert!(parse(r#"{99999999999: ["A"]}"#).is_empty());
    }

    #[test]
    fn test_rejects_unquoted_and_unterminated_items() {
        assert!(parse("{1: [Politics, Law]}").is_empty());
        assert!(parse("{1: ['Politics', 'Law}").is_empty());
        assert!(parse("{1: 'Politics'}").is_empty());
        assert!(parse("{1: ['A' 'B']}").is_empty());
    }

    #[test]
    fn test_escapes_trailing_comma_and_colon_in_topic() {
        let out = parse(r#"{5: ['Rock \'n\' Roll', "Time: Now",]}"#);
        assert_eq!(out[0].topics, ["Rock 'n' Roll", "Time: Now", UNTAGGED]);
    }

    #[test]
    fn test_extra_topics_truncated_and_empty_list_padded() {
        let out = parse(r#"{1: ["A","B","C","D"]} {2: []}"#);
        assert_eq!(out[0].topics, ["A", "B", "C"]);
        assert_eq!(out[1].topics, [UNTAGGED, UNTAGGED, UNTAGGED]);
    }

    #[test]
    fn test_multiline_fragment() {
        let out = parse("{\n  8:\n  [\"War\",\n   \"Politics\"]\n}");
        assert_eq!(out[0].topics, ["War", "Politics", UNTAGGED]);
    }

    #[test]
    fn test_never_fails_on_garbage() {
        let garbage = [
            "",
            "}{",
            "{{{",
            "{:}",
            "{1:",
            "no braces at all",
            "{\u{1F600}: ['x']}",
            r#"{1: ["\"] }"#,
        ];
        for raw in garbage {
            assert!(parse_report(raw).assignments.is_empty(), "{raw:?}");
        }
        // The escaped quote leaves the string unterminated.
        assert_eq!(parse_report(r#"{1: ["\"] }"#).skipped, 1);
        assert!(parse("}{").is_empty());
    }
}
