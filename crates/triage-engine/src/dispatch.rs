//! Caller side of the orchestrator: one dispatch per chat mention.

use crate::guard::ThreadGuard;
use crate::orchestrator::WorkflowOrchestrator;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use triage_core::conversation::ConversationMessage;
use triage_core::protocol::ChatChannel;
use triage_core::workflow::{workflow_id, WorkflowRecord, WorkflowResult};

pub const DEFAULT_MAX_MESSAGES: usize = 50;

const ALREADY_RUNNING: &str = "Already processing this thread...";
const PROCESSING: &str = "Processing thread... This may take a minute.";
const NEEDS_CONTEXT: &str =
    "Please provide more context about the issue. Create a thread with details, then mention me.";
const SIMILAR_ISSUES_SHOWN: usize = 3;

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@[A-Z0-9]+>").expect("mention regex is valid"))
}

/// Remove `<@U123>` style mentions and surrounding whitespace.
pub fn strip_mentions(text: &str) -> String {
    mention_pattern().replace_all(text, "").trim().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Another dispatch holds the thread
    AlreadyRunning,
    /// Neither the thread nor the mention carried any text
    NeedsContext,
    Finished(WorkflowResult),
}

pub struct ThreadDispatcher {
    orchestrator: Arc<WorkflowOrchestrator>,
    chat: Arc<dyn ChatChannel>,
    guard: ThreadGuard,
    max_messages: usize,
}

impl ThreadDispatcher {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>, chat: Arc<dyn ChatChannel>) -> Self {
        Self {
            orchestrator,
            chat,
            guard: ThreadGuard::new(),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    pub fn guard(&self) -> &ThreadGuard {
        &self.guard
    }

    /// Handle a mention in `thread_id`. `history` is the thread as fetched from
    /// the chat platform, oldest first.
    pub async fn handle(
        &self,
        channel_id: &str,
        thread_id: &str,
        author: &str,
        mention_text: &str,
        history: Vec<ConversationMessage>,
    ) -> DispatchOutcome {
        let key = workflow_id(channel_id, thread_id);
        let Some(_lease) = self.guard.try_acquire(&key) else {
            tracing::info!(workflow_id = %key, "thread already in progress");
            self.post(channel_id, thread_id, ALREADY_RUNNING).await;
            return DispatchOutcome::AlreadyRunning;
        };

        self.post(channel_id, thread_id, PROCESSING).await;

        let conversation = self.conversation(author, mention_text, history);
        if conversation.is_empty() {
            self.post(channel_id, thread_id, NEEDS_CONTEXT).await;
            return DispatchOutcome::NeedsContext;
        }

        let result = self
            .orchestrator
            .run(&conversation, channel_id, thread_id)
            .await;
        let response = if result.success {
            format_success(&result)
        } else {
            format_failure(&result)
        };
        self.post(channel_id, thread_id, &response).await;
        DispatchOutcome::Finished(result)
    }

    /// Human-readable audit trail for a workflow id.
    pub fn status(&self, workflow_id: &str) -> String {
        match self.orchestrator.get_status(workflow_id) {
            Some(record) => format_status(&record),
            None => format!("No workflow found with ID: {}", workflow_id),
        }
    }

    /// Cleaned, capped thread; the mention itself stands in for an empty thread.
    fn conversation(
        &self,
        author: &str,
        mention_text: &str,
        history: Vec<ConversationMessage>,
    ) -> Vec<ConversationMessage> {
        let messages: Vec<ConversationMessage> = history
            .into_iter()
            .take(self.max_messages)
            .filter_map(|mut message| {
                message.text = strip_mentions(&message.text);
                (!message.text.is_empty()).then_some(message)
            })
            .collect();
        if !messages.is_empty() {
            return messages;
        }

        let text = strip_mentions(mention_text);
        if text.is_empty() {
            Vec::new()
        } else {
            vec![ConversationMessage::synthetic(author, text)]
        }
    }

    async fn post(&self, channel_id: &str, thread_id: &str, text: &str) {
        if let Err(err) = self.chat.post(channel_id, thread_id, text).await {
            tracing::warn!(channel = %channel_id, thread = %thread_id, error = %err, "chat post failed");
        }
    }
}

pub fn format_success(result: &WorkflowResult) -> String {
    let mut lines = vec![
        "**Bug Report Processed Successfully**".to_string(),
        String::new(),
        format!(
            "**Jira Ticket:** [{}]({})",
            result.issue_key.as_deref().unwrap_or_default(),
            result.issue_url.as_deref().unwrap_or_default()
        ),
        format!("**Severity:** {}", result.severity.unwrap_or_default()),
    ];

    match &result.pr_url {
        Some(url) => {
            lines.push(format!("**Pull Request:** [View PR]({})", url));
            lines.push(String::new());
            lines.push("_The PR has been created and is ready for review._".to_string());
        }
        None => {
            lines.push(String::new());
            lines.push(
                "_No automated fix could be generated. Manual investigation required._"
                    .to_string(),
            );
        }
    }

    if !result.similar_issues.is_empty() {
        lines.push(String::new());
        lines.push("**Similar Issues Found:**".to_string());
        for issue in result.similar_issues.iter().take(SIMILAR_ISSUES_SHOWN) {
            lines.push(format!("• {}: {} ({})", issue.key, issue.summary, issue.status));
        }
    }

    lines.push(String::new());
    lines.push(format!("_Workflow ID: `{}`_", result.workflow_id));
    lines.join("\n")
}

pub fn format_failure(result: &WorkflowResult) -> String {
    format!(
        "**Failed to process bug report**\n\n**Error:** {}\n\nPlease try again or create the ticket manually.\n\n_Workflow ID: `{}`_",
        result.error.as_deref().unwrap_or("Unknown error"),
        result.workflow_id
    )
}

pub fn format_status(record: &WorkflowRecord) -> String {
    let mut lines = vec![
        format!("**Workflow Status:** {}", record.status),
        format!("**Started:** {}", record.started_at.to_rfc3339()),
        String::new(),
        "**Steps:**".to_string(),
    ];
    for step in &record.steps {
        let marker = if step.status.is_terminal() { "✓" } else { "→" };
        lines.push(format!(
            "{} {} - {}",
            marker,
            step.status,
            step.timestamp.to_rfc3339()
        ));
    }
    lines.join("\n")
}
