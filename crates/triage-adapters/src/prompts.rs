// ═══════════════════════════════════════════════════════════════════════════════
// SHARED BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

use triage_core::conversation::{transcript, ConversationMessage};
use triage_core::report::BugReport;
use triage_core::util::truncate;

/// Keys the report extraction must return
const REPORT_KEYS: &str = "title, description, steps_to_reproduce, expected_behavior, \
actual_behavior, severity, affected_components, additional_context";

/// Output contract for fix proposals
const FIX_OUTPUT: &str = r#"Return JSON with these exact keys:
- root_cause: brief explanation of the issue
- fix_description: what the fix does
- code_changes: array of {"file": "path/to/file", "changes": "..."}
- testing_notes: how to test the fix

For each entry in code_changes, "changes" is EITHER:
- a unified diff against the current file (hunks starting with "@@ -a,b +c,d @@",
  context lines prefixed with a space), preferred for small edits to existing files, OR
- the COMPLETE new file content, for new files or rewrites.
Never return partial file content without hunk headers."#;

/// Edit rules shared by every fix prompt
const EDIT_RULES: &str = r#"RULES:
- Make the smallest change that fixes the root cause.
- Preserve file structure, indentation and surrounding style.
- Context and removed lines in a diff must match the current file exactly.
- Return an empty code_changes array if the context is not enough to fix the bug safely."#;

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn report_prompt(conversation: &[ConversationMessage]) -> String {
    format!(
        r#"You are analyzing a chat conversation about a bug or issue. Extract and structure the information into a clear bug report.

Conversation:
{transcript}

Extract the following information:
1. Bug Title (concise, descriptive)
2. Bug Description (detailed explanation)
3. Steps to Reproduce (if mentioned)
4. Expected Behavior
5. Actual Behavior
6. Severity (Critical/High/Medium/Low)
7. Affected Components (files, services, features mentioned)
8. Additional Context

Return as JSON with these exact keys: {keys}"#,
        transcript = transcript(conversation),
        keys = REPORT_KEYS,
    )
}

/// Fix prompt; the code context is cut to `max_context_chars`.
pub fn fix_prompt(report: &BugReport, context: &str, max_context_chars: usize) -> String {
    format!(
        r#"You are an expert software engineer. Analyze the bug report and code context to generate a precise fix.

Bug Report:
Title: {title}
Description: {description}
Expected: {expected}
Actual: {actual}
Severity: {severity}
Affected Components: {components}

Code Context:
{context}

{output}

{rules}"#,
        title = report.title,
        description = report.description,
        expected = report.expected_behavior,
        actual = report.actual_behavior,
        severity = report.severity,
        components = report.affected_components.join(", "),
        context = truncate(context, max_context_chars),
        output = FIX_OUTPUT,
        rules = EDIT_RULES,
    )
}
