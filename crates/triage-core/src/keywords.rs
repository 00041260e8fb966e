//! Search keywords derived from a bug report

use crate::report::{AffectedComponents, BugReport};

pub const MAX_KEYWORDS: usize = 5;

/// Filler words that never make useful code-search terms.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "when", "where", "this", "that",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.iter().any(|stop| stop.eq_ignore_ascii_case(word))
}

/// Strip sentence punctuation around a title word, keeping `_` and inner dots
/// so `config.ts` and `user_id` survive.
fn clean_title_word(word: &str) -> &str {
    word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
}

/// Title words longer than three characters, then the components, minus stop-words,
/// deduplicated case-insensitively and capped at five.
pub fn extract(report: &BugReport) -> Vec<String> {
    extract_parts(
        &report.title,
        &AffectedComponents::Many(report.affected_components.clone()),
    )
}

/// Same as [`extract`] for callers holding the raw string-or-list component shape.
pub fn extract_parts(title: &str, components: &AffectedComponents) -> Vec<String> {
    let title_words = title
        .split_whitespace()
        .map(clean_title_word)
        .filter(|word| word.chars().count() > 3)
        .map(str::to_string);
    let component_words = components.clone().into_vec();

    let mut keywords: Vec<String> = Vec::with_capacity(MAX_KEYWORDS);
    for word in title_words.chain(component_words) {
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        if is_stopword(&word) || keywords.iter().any(|k| k.eq_ignore_ascii_case(&word)) {
            continue;
        }
        keywords.push(word);
    }
    keywords
}
