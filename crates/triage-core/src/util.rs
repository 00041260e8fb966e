/// Maximum length for response content quoted in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Truncate a string to at most `max_chars` characters (Unicode-safe)
pub fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Sanitize response content before it reaches an error message or log line.
/// Truncates long bodies and redacts anything that looks like it carries a secret.
pub fn sanitize_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "token",
        "sk-ant-", // Anthropic key prefix
        "ghp_",    // GitHub personal access token prefix
        "github_pat_",
    ];

    let truncated = truncate(content, MAX_ERROR_CONTENT_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(response details redacted - may contain sensitive data)".to_string();
    }

    if truncated.len() < content.len() {
        format!("{}... (truncated)", truncated)
    } else {
        truncated.to_string()
    }
}
