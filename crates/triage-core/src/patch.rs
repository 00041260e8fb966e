//! Unified diff parsing and application
//!
//! Model output is rarely a pristine `git diff`: file headers may be missing,
//! hunk counts may be off, and line numbers may drift by a few lines. Hunks are
//! therefore anchored by their content (context + removed lines), starting at the
//! offset the header claims and widening outwards until a match is found.
//!
//! Every hunk is located against the original document before anything is
//! rewritten, then spliced bottom-up so earlier offsets stay valid. The result does
//! not depend on the order hunks appear in the patch.

use crate::error::PatchError;
use regex::Regex;
use std::sync::OnceLock;

/// A single line in a diff hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Add(String),
    Remove(String),
}

impl DiffLine {
    pub fn content(&self) -> &str {
        match self {
            DiffLine::Context(s) => s,
            DiffLine::Add(s) => s,
            DiffLine::Remove(s) => s,
        }
    }
}

/// A hunk in a unified diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 0-based line offset in the original document
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Lines the hunk expects to find in the document (context and removals).
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Context(_) | DiffLine::Remove(_)))
            .map(DiffLine::content)
            .collect()
    }

    /// Lines that replace them (context and additions).
    fn new_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Context(_) | DiffLine::Add(_)))
            .map(|l| l.content().to_string())
            .collect()
    }

    /// (additions, removals)
    pub fn summary(&self) -> (usize, usize) {
        let adds = self
            .lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Add(_)))
            .count();
        let removes = self
            .lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Remove(_)))
            .count();
        (adds, removes)
    }
}

fn hunk_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
    })
}

/// True when `text` contains at least one `@@ -a,b +c,d @@` header.
pub fn is_patch(text: &str) -> bool {
    text.lines().any(|line| hunk_header().is_match(line))
}

fn capture_number(caps: &regex::Captures<'_>, idx: usize, default: usize) -> usize {
    caps.get(idx)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(default)
}

fn open_hunk(caps: &regex::Captures<'_>) -> Hunk {
    let old_start = capture_number(caps, 1, 1);
    let old_count = capture_number(caps, 2, 1);
    let new_start = capture_number(caps, 3, 1);
    let new_count = capture_number(caps, 4, 1);
    // With a zero count the start names the line *after which* text is inserted.
    let offset = if old_count == 0 {
        old_start
    } else {
        old_start.saturating_sub(1)
    };
    Hunk {
        old_start: offset,
        old_count,
        new_start,
        new_count,
        lines: Vec::new(),
    }
}

fn close_hunk(hunks: &mut Vec<Hunk>, current: &mut Option<Hunk>, pending_blank: &mut usize) {
    // Trailing blank lines are formatting noise, not context.
    *pending_blank = 0;
    if let Some(hunk) = current.take() {
        if !hunk.lines.is_empty() {
            hunks.push(hunk);
        }
    }
}

/// Parse every hunk in `patch`, in discovery order. Text outside hunks is ignored.
pub fn parse_hunks(patch: &str) -> Vec<Hunk> {
    let lines: Vec<&str> = patch.lines().collect();
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut pending_blank = 0usize;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim_end_matches('\r');

        if let Some(caps) = hunk_header().captures(line) {
            close_hunk(&mut hunks, &mut current, &mut pending_blank);
            current = Some(open_hunk(&caps));
            i += 1;
            continue;
        }

        // A file header pair or a `diff` line ends the current hunk.
        let next_is_new_file = lines
            .get(i + 1)
            .is_some_and(|next| next.starts_with("+++ "));
        if line.starts_with("diff ") || (line.starts_with("--- ") && next_is_new_file) {
            close_hunk(&mut hunks, &mut current, &mut pending_blank);
            i += if line.starts_with("--- ") { 2 } else { 1 };
            continue;
        }

        if let Some(hunk) = current.as_mut() {
            if line.is_empty() {
                pending_blank += 1;
            } else {
                let parsed = match line.as_bytes()[0] {
                    b'+' => Some(DiffLine::Add(line[1..].to_string())),
                    b'-' => Some(DiffLine::Remove(line[1..].to_string())),
                    b' ' => Some(DiffLine::Context(line[1..].to_string())),
                    // "\ No newline at end of file" and stray prose
                    _ => None,
                };
                if let Some(parsed) = parsed {
                    for _ in 0..pending_blank {
                        hunk.lines.push(DiffLine::Context(String::new()));
                    }
                    pending_blank = 0;
                    hunk.lines.push(parsed);
                }
            }
        }
        i += 1;
    }
    close_hunk(&mut hunks, &mut current, &mut pending_blank);
    hunks
}

fn same_line(doc: &str, expected: &str) -> bool {
    doc.trim_end() == expected.trim_end()
}

/// Does `old` match `doc` at `pos`? Lines that run past the end of the document are
/// only tolerated when `allow_clamp` is set, and at least the first old line must
/// still line up with the document.
fn matches_at(doc: &[String], old: &[&str], pos: usize, allow_clamp: bool) -> bool {
    if pos > doc.len() || (!old.is_empty() && pos == doc.len()) {
        return false;
    }
    if !allow_clamp && pos + old.len() > doc.len() {
        return false;
    }
    old.iter()
        .zip(doc[pos..].iter())
        .all(|(expected, actual)| same_line(actual, expected))
}

/// Find where a hunk applies: its stated offset first, then the nearest offset
/// (earlier before later at equal distance) where the old lines match exactly.
fn locate(doc: &[String], hunk: &Hunk) -> Option<usize> {
    let old = hunk.old_lines();
    let stated = hunk.old_start.min(doc.len());
    if old.is_empty() {
        return Some(stated);
    }
    if matches_at(doc, &old, stated, true) {
        return Some(stated);
    }
    for distance in 1..=doc.len() {
        if let Some(before) = stated.checked_sub(distance) {
            if matches_at(doc, &old, before, false) {
                return Some(before);
            }
        }
        let after = stated + distance;
        if after < doc.len() && matches_at(doc, &old, after, false) {
            return Some(after);
        }
        if distance > stated && after >= doc.len() {
            break;
        }
    }
    None
}

struct Placement {
    index: usize,
    start: usize,
    len: usize,
}

/// Apply `patch` to `original`, reporting why it could not be applied.
pub fn try_apply(original: &str, patch: &str) -> Result<String, PatchError> {
    let hunks = parse_hunks(patch);
    if hunks.is_empty() {
        return Err(PatchError::NoHunks);
    }

    let newline = if original.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = original.lines().map(str::to_string).collect();

    let mut placements = Vec::with_capacity(hunks.len());
    for (index, hunk) in hunks.iter().enumerate() {
        let start = locate(&lines, hunk).ok_or(PatchError::Conflict {
            hunk: index,
            old_start: hunk.old_start + 1,
        })?;
        // Old lines past the end of the document are clamped away.
        let len = hunk.old_lines().len().min(lines.len() - start);
        placements.push(Placement { index, start, len });
    }

    // Pure insertions sort ahead of a replacement anchored at the same line.
    placements.sort_by_key(|p| (p.start, p.len > 0, p.index));
    for pair in placements.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if first.start + first.len > second.start {
            return Err(PatchError::Overlap {
                first: first.index,
                second: second.index,
            });
        }
    }

    // Bottom-up so offsets computed against the original stay valid.
    for placement in placements.iter().rev() {
        let hunk = &hunks[placement.index];
        lines.splice(
            placement.start..placement.start + placement.len,
            hunk.new_lines(),
        );
    }

    let mut result = lines.join(newline);
    if original.ends_with('\n') && !result.is_empty() {
        result.push_str(newline);
    }
    Ok(result)
}

/// Apply `patch` to `original`. Never fails: an unparsable or conflicting patch
/// returns `original` unchanged, so callers detect a no-op by comparing.
pub fn apply(original: &str, patch: &str) -> String {
    try_apply(original, patch).unwrap_or_else(|_| original.to_string())
}

#[cfg(test)]
mod tests;
