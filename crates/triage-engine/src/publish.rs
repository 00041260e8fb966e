//! Branch names, pull request text and ticket comments

use triage_core::fix::FixProposal;
use triage_core::report::{BugReport, Severity};

const MAX_SLUG_CHARS: usize = 30;

pub const MANUAL_FIX_COMMENT: &str =
    "No automated fix generated. Manual investigation required.";

/// `fix/<key>-<slug>`, lowercase, at most 30 slug characters.
pub fn branch_name(issue_key: &str, title: &str) -> String {
    let key = issue_key.to_lowercase();
    let slug = sanitize_branch_slug(title);
    if slug.is_empty() {
        format!("fix/{}", key)
    } else {
        format!("fix/{}-{}", key, slug)
    }
}

fn sanitize_branch_slug(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    slug.chars()
        .take(MAX_SLUG_CHARS)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Branch name used for the single retry after a collision.
pub fn disambiguated_branch_name(name: &str, unix_secs: i64) -> String {
    format!("{}-{}", name, unix_secs)
}

pub fn pr_title(issue_key: &str, title: &str) -> String {
    format!("[{}] Fix: {}", issue_key, title)
}

pub fn pr_labels(severity: Severity) -> Vec<String> {
    vec![
        format!("severity:{}", severity.as_str().to_lowercase()),
        "bug".to_string(),
        "auto-generated".to_string(),
    ]
}

pub fn commit_message(issue_key: &str, path: &str) -> String {
    format!("fix({}): update {}", issue_key, path)
}

pub fn pr_comment(pr_url: &str) -> String {
    format!("Pull Request created: {}", pr_url)
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

pub fn pr_body(issue_key: &str, issue_url: &str, report: &BugReport, fix: &FixProposal) -> String {
    let mut sections = vec![
        format!("## Bug Fix for {}", issue_key),
        format!("**Ticket:** [{}]({})", issue_key, issue_url),
        "## Problem".to_string(),
        or_default(&report.description, "See the ticket for details").to_string(),
    ];

    if !fix.root_cause.trim().is_empty() {
        sections.push("## Root Cause".to_string());
        sections.push(fix.root_cause.clone());
    }

    sections.push("## Solution".to_string());
    sections.push(or_default(&fix.fix_description, "Applied automated fix").to_string());

    if fix.has_code_changes() {
        sections.push("## Files Modified".to_string());
        sections.push(
            fix.code_changes
                .iter()
                .map(|change| format!("- `{}`", change.path))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }

    sections.push("## Testing".to_string());
    sections.push(or_default(&fix.testing_notes, "- [ ] Manual testing required").to_string());
    sections.push("- [ ] Code review completed\n- [ ] Tests pass".to_string());

    sections.push("---".to_string());
    sections.push("*This PR was generated automatically from a chat bug report.*".to_string());
    sections.join("\n\n")
}
