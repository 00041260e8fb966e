//! Tolerant JSON extraction from language-model text
//!
//! Models wrap JSON in markdown fences, prefix it with prose, add an extra pair
//! of braces or leave trailing commas. Each piece of text is expanded into a few
//! deterministic repairs; the first candidate that deserializes wins.

use crate::error::CollaboratorError;
use crate::util::sanitize_response;

/// Balanced objects pulled out of a single candidate
const MAX_EMBEDDED_OBJECTS: usize = 4;

/// Tracks whether a character stream is inside a JSON string literal.
#[derive(Default)]
struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    /// Feed one character; true when it is structural (outside any string).
    fn structural(&mut self, ch: char) -> bool {
        if self.in_string {
            match ch {
                _ if self.escaped => self.escaped = false,
                '\\' => self.escaped = true,
                '"' => self.in_string = false,
                _ => {}
            }
            return false;
        }
        if ch == '"' {
            self.in_string = true;
            return false;
        }
        true
    }
}

/// Body of a ```` ```lang ... ``` ```` block spanning the whole text.
fn fenced_body(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix("```")?;
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    let end = body.rfind("```")?;
    Some(body[..end].trim())
}

/// `{ {...} }` or `{ [...] }` -> the inner value.
fn without_wrapper(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix('{')?.strip_suffix('}')?.trim();
    inner.starts_with(['{', '[']).then_some(inner)
}

/// The balanced object or array starting at byte `start`, if it closes.
fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut state = StringState::default();
    let mut closers = Vec::new();
    for (offset, ch) in text[start..].char_indices() {
        if !state.structural(ch) {
            continue;
        }
        match ch {
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(ch) {
                    return None;
                }
                if closers.is_empty() {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Balanced objects embedded in surrounding prose, in order of appearance.
fn embedded_objects(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices('{')
        .filter_map(move |(start, _)| balanced_from(text, start))
        .take(MAX_EMBEDDED_OBJECTS)
}

/// Drop commas that directly precede a closing bracket, outside of strings.
fn without_trailing_commas(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut state = StringState::default();
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    for (i, &ch) in chars.iter().enumerate() {
        if state.structural(ch) && ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                changed = true;
                continue;
            }
        }
        out.push(ch);
    }
    changed.then_some(out)
}

fn add(found: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() && !found.iter().any(|c| c == text) {
        found.push(text.to_string());
    }
}

/// Every repair reachable from `content`, original text first.
fn candidates(content: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    add(&mut found, content);
    if let Some(body) = fenced_body(content) {
        add(&mut found, body);
    }

    // Worklist: repairs of repairs are tried too, deduplicated.
    let mut next = 0;
    while next < found.len() {
        let current = found[next].clone();
        for object in embedded_objects(&current) {
            add(&mut found, object);
        }
        if let Some(inner) = without_wrapper(&current) {
            add(&mut found, inner);
        }
        if let Some(relaxed) = without_trailing_commas(&current) {
            add(&mut found, &relaxed);
        }
        next += 1;
    }
    found
}

/// Deserialize `T` from model output, salvaging JSON from common wrappers.
pub fn parse_structured_content<T>(content: &str) -> Result<T, CollaboratorError>
where
    T: serde::de::DeserializeOwned,
{
    let mut last_err = None;
    for candidate in candidates(content) {
        match serde_json::from_str::<T>(&candidate) {
            Ok(data) => return Ok(data),
            Err(err) => last_err = Some(err),
        }
    }

    Err(CollaboratorError::Malformed(format!(
        "failed to parse structured response: {}; content: {}",
        last_err.map_or_else(|| "empty response".to_string(), |e| e.to_string()),
        sanitize_response(content)
    )))
}
