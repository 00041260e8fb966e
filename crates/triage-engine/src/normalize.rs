//! Conversation -> `BugReport`, with a deterministic fallback.

use std::sync::Arc;
use triage_core::conversation::{transcript, ConversationMessage};
use triage_core::protocol::LanguageModel;
use triage_core::report::{BugReport, Severity};
use triage_core::util::truncate;

pub const FALLBACK_TITLE: &str = "Bug report from conversation";
const FALLBACK_DESCRIPTION_CHARS: usize = 500;

pub struct ReportNormalizer {
    model: Arc<dyn LanguageModel>,
}

impl ReportNormalizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Never fails and never returns an empty title.
    pub async fn normalize(&self, conversation: &[ConversationMessage]) -> BugReport {
        match self.model.extract_report(conversation).await {
            Ok(payload) => match payload.into_report() {
                Some(report) => report,
                None => {
                    tracing::warn!("model report had no title; using fallback report");
                    fallback_report(conversation)
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "report extraction failed; using fallback report");
                fallback_report(conversation)
            }
        }
    }
}

/// Report synthesized from the raw transcript.
pub fn fallback_report(conversation: &[ConversationMessage]) -> BugReport {
    let transcript = transcript(conversation);
    BugReport {
        title: FALLBACK_TITLE.to_string(),
        description: truncate(&transcript, FALLBACK_DESCRIPTION_CHARS).to_string(),
        steps_to_reproduce: "See conversation".to_string(),
        expected_behavior: "System should work as intended".to_string(),
        actual_behavior: "Issue reported in conversation".to_string(),
        severity: Severity::Medium,
        affected_components: Vec::new(),
        additional_context: transcript,
    }
}
