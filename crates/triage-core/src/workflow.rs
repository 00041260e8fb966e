//! Workflow state machine for the report -> ticket -> fix -> PR pipeline
//!
//! Status only moves forward. `Failed` is reachable from any non-terminal status;
//! `Completed` and `Failed` are terminal.

use crate::error::TransitionError;
use crate::protocol::SimilarIssue;
use crate::report::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Started,
    ParsingBugReport,
    BugReportParsed,
    AnalyzingCodebase,
    GeneratingFix,
    FixGenerated,
    CreatingJiraTicket,
    JiraTicketCreated,
    CreatingPr,
    PrCreated,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Started => "started",
            WorkflowStatus::ParsingBugReport => "parsing_bug_report",
            WorkflowStatus::BugReportParsed => "bug_report_parsed",
            WorkflowStatus::AnalyzingCodebase => "analyzing_codebase",
            WorkflowStatus::GeneratingFix => "generating_fix",
            WorkflowStatus::FixGenerated => "fix_generated",
            WorkflowStatus::CreatingJiraTicket => "creating_jira_ticket",
            WorkflowStatus::JiraTicketCreated => "jira_ticket_created",
            WorkflowStatus::CreatingPr => "creating_pr",
            WorkflowStatus::PrCreated => "pr_created",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    /// Human-readable status for display
    pub fn status_text(&self) -> &'static str {
        match self {
            WorkflowStatus::Started => "Started",
            WorkflowStatus::ParsingBugReport => "Parsing bug report...",
            WorkflowStatus::BugReportParsed => "Bug report parsed",
            WorkflowStatus::AnalyzingCodebase => "Analyzing codebase...",
            WorkflowStatus::GeneratingFix => "Generating fix...",
            WorkflowStatus::FixGenerated => "Fix generated",
            WorkflowStatus::CreatingJiraTicket => "Creating ticket...",
            WorkflowStatus::JiraTicketCreated => "Ticket created",
            WorkflowStatus::CreatingPr => "Creating pull request...",
            WorkflowStatus::PrCreated => "Pull request created",
            WorkflowStatus::Completed => "Complete!",
            WorkflowStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (*self, next),
            (_, Failed)
                | (Started, ParsingBugReport)
                | (ParsingBugReport, BugReportParsed)
                | (BugReportParsed, AnalyzingCodebase)
                | (AnalyzingCodebase, GeneratingFix)
                | (GeneratingFix, FixGenerated)
                | (FixGenerated, CreatingJiraTicket)
                | (CreatingJiraTicket, JiraTicketCreated)
                | (JiraTicketCreated, CreatingPr)
                | (JiraTicketCreated, Completed)
                | (CreatingPr, PrCreated)
                // Changes that could not be applied end without a PR
                | (CreatingPr, Completed)
                | (PrCreated, Completed)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key for the workflow owning a chat thread.
pub fn workflow_id(channel_id: &str, thread_id: &str) -> String {
    format!("{}_{}", channel_id, thread_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub status: WorkflowStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Audit trail for one workflow. Steps are append-only with non-decreasing timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            id: id.into(),
            status: WorkflowStatus::Started,
            started_at,
            steps: vec![WorkflowStep {
                status: WorkflowStatus::Started,
                timestamp: started_at,
                data: serde_json::Value::Null,
            }],
        }
    }

    /// Append a transition, rejecting anything that is not a forward move.
    pub fn record(
        &mut self,
        status: WorkflowStatus,
        data: serde_json::Value,
    ) -> Result<(), TransitionError> {
        if !self.status.can_advance_to(status) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: status,
            });
        }
        let last = self
            .steps
            .last()
            .map(|step| step.timestamp)
            .unwrap_or(self.started_at);
        self.steps.push(WorkflowStep {
            status,
            timestamp: Utc::now().max(last),
            data,
        });
        self.status = status;
        Ok(())
    }

    pub fn last_step(&self) -> Option<&WorkflowStep> {
        self.steps.last()
    }
}

/// What a workflow run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similar_issues: Vec<SimilarIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

impl WorkflowResult {
    pub fn failed(workflow_id: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut error = error.to_string();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        Self {
            success: false,
            workflow_id: workflow_id.into(),
            issue_key: None,
            issue_url: None,
            pr_url: None,
            title: None,
            severity: None,
            similar_issues: Vec::new(),
            message: format!("Failed to process bug report: {}", error),
            error: Some(error),
        }
    }
}
