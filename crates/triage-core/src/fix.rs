use crate::patch;
use serde::{Deserialize, Serialize};

/// Language model's proposed fix for a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixProposal {
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub fix_description: String,
    #[serde(default)]
    pub code_changes: Vec<FileChange>,
    #[serde(default)]
    pub testing_notes: String,
}

impl FixProposal {
    /// Proposal used when no automated fix could be produced.
    pub fn manual_fix_required() -> Self {
        Self {
            root_cause: "Manual analysis required".to_string(),
            fix_description: "This issue requires manual investigation".to_string(),
            code_changes: Vec::new(),
            testing_notes: "Manual testing required".to_string(),
        }
    }

    pub fn has_code_changes(&self) -> bool {
        !self.code_changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEncoding {
    /// `content_or_patch` replaces the whole file
    FullContent,
    /// `content_or_patch` is a unified diff against the current file
    Patch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path
    #[serde(alias = "file")]
    pub path: String,
    #[serde(
        rename = "changes",
        alias = "content",
        alias = "content_or_patch",
        alias = "unified_diff",
        alias = "patch"
    )]
    pub content_or_patch: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, content_or_patch: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_or_patch: content_or_patch.into(),
        }
    }

    pub fn encoding(&self) -> ChangeEncoding {
        if patch::is_patch(&self.content_or_patch) {
            ChangeEncoding::Patch
        } else {
            ChangeEncoding::FullContent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_proposal_accepts_model_field_names() {
        let json = r#"{
            "root_cause": "handler never bound",
            "fix_description": "bind onClick",
            "code_changes": [{"file": "src/Login.tsx", "changes": "export {}"}],
            "testing_notes": "click it"
        }"#;
        let fix: FixProposal = serde_json::from_str(json).unwrap();
        assert_eq!(fix.code_changes.len(), 1);
        assert_eq!(fix.code_changes[0].path, "src/Login.tsx");
        assert_eq!(fix.code_changes[0].encoding(), ChangeEncoding::FullContent);
    }

    #[test]
    fn test_missing_code_changes_defaults_to_empty() {
        let fix: FixProposal = serde_json::from_str(r#"{"root_cause": "unknown"}"#).unwrap();
        assert!(!fix.has_code_changes());
    }

    #[test]
    fn test_patch_encoding_detected_from_hunk_header() {
        let change = FileChange::new("a.txt", "@@ -2,1 +2,1 @@\n-old\n+new\n");
        assert_eq!(change.encoding(), ChangeEncoding::Patch);
    }

    #[test]
    fn test_manual_fix_has_no_changes() {
        let manual = FixProposal::manual_fix_required();
        assert!(!manual.has_code_changes());
        assert_eq!(manual.root_cause, "Manual analysis required");
    }
}
