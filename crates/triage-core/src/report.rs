//! Structured bug report and the raw payload it is repaired from

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }

    /// Case-insensitive parse that also understands common tracker priority names.
    /// Anything unrecognised is `Medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" | "highest" | "urgent" | "p0" => Severity::Critical,
            "high" | "major" | "p1" => Severity::High,
            "low" | "minor" | "trivial" | "lowest" | "p3" | "p4" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Components may arrive as a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AffectedComponents {
    One(String),
    Many(Vec<String>),
}

impl Default for AffectedComponents {
    fn default() -> Self {
        AffectedComponents::Many(Vec::new())
    }
}

impl AffectedComponents {
    /// Canonical ordered list: trimmed, blanks dropped, first occurrence wins.
    pub fn into_vec(self) -> Vec<String> {
        let raw = match self {
            AffectedComponents::One(single) => vec![single],
            AffectedComponents::Many(list) => list,
        };
        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for item in raw {
            let trimmed = item.trim();
            if trimmed.is_empty() || out.iter().any(|existing| existing == trimmed) {
                continue;
            }
            out.push(trimmed.to_string());
        }
        out
    }
}

impl From<Vec<String>> for AffectedComponents {
    fn from(list: Vec<String>) -> Self {
        AffectedComponents::Many(list)
    }
}

impl From<&str> for AffectedComponents {
    fn from(single: &str) -> Self {
        AffectedComponents::One(single.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps_to_reproduce: String,
    #[serde(default)]
    pub expected_behavior: String,
    #[serde(default)]
    pub actual_behavior: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub affected_components: Vec<String>,
    #[serde(default)]
    pub additional_context: String,
}

/// Free-text field that a model may emit as a string or as a list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum TextValue {
    Text(String),
    Lines(Vec<String>),
}

impl TextValue {
    fn into_text(self) -> String {
        match self {
            TextValue::Text(text) => text.trim().to_string(),
            TextValue::Lines(lines) => lines
                .iter()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn text(value: Option<TextValue>) -> String {
    value.map(TextValue::into_text).unwrap_or_default()
}

/// Report as produced by the language model, before repair.
///
/// Every field is optional so a partially filled object still parses;
/// `into_report` decides whether it is usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<TextValue>,
    #[serde(default)]
    steps_to_reproduce: Option<TextValue>,
    #[serde(default)]
    expected_behavior: Option<TextValue>,
    #[serde(default)]
    actual_behavior: Option<TextValue>,
    #[serde(default)]
    severity: Option<serde_json::Value>,
    #[serde(default)]
    affected_components: Option<AffectedComponents>,
    #[serde(default)]
    additional_context: Option<TextValue>,
}

impl ReportPayload {
    /// Payload carrying only a title, mostly useful for collaborators that build reports by hand.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_severity(mut self, severity: &str) -> Self {
        self.severity = Some(serde_json::Value::String(severity.to_string()));
        self
    }

    pub fn with_components(mut self, components: impl Into<AffectedComponents>) -> Self {
        self.affected_components = Some(components.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(TextValue::Text(description.into()));
        self
    }

    /// Repair into a `BugReport`. `None` when the title is missing or blank.
    pub fn into_report(self) -> Option<BugReport> {
        let title = self.title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return None;
        }

        let severity = self
            .severity
            .as_ref()
            .and_then(|value| value.as_str())
            .map(Severity::parse_lenient)
            .unwrap_or_default();

        Some(BugReport {
            title: title.to_string(),
            description: text(self.description),
            steps_to_reproduce: text(self.steps_to_reproduce),
            expected_behavior: text(self.expected_behavior),
            actual_behavior: text(self.actual_behavior),
            severity,
            affected_components: self
                .affected_components
                .map(AffectedComponents::into_vec)
                .unwrap_or_default(),
            additional_context: text(self.additional_context),
        })
    }
}
