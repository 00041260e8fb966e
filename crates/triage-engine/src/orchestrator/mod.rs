//! End-to-end workflow: conversation -> report -> context -> fix -> ticket -> PR
//!
//! Failure policy:
//! - report extraction, similar-issue search, context assembly and fix proposal
//!   degrade to safe defaults
//! - ticket creation failure ends the workflow in `failed`
//! - once a ticket exists, branch/apply/PR failures are reported on the ticket
//!   and the workflow still completes, without a PR
//!
//! `run` never returns an error and never lets a panic escape.

use crate::context::{CodeContextAssembler, ContextConfig};
use crate::normalize::ReportNormalizer;
use crate::publish;
use crate::store::WorkflowStore;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use triage_core::conversation::ConversationMessage;
use triage_core::error::{CollaboratorError, WorkflowError};
use triage_core::fix::{ChangeEncoding, FileChange, FixProposal};
use triage_core::keywords;
use triage_core::patch;
use triage_core::protocol::{
    IssueTracker, LanguageModel, PullRequestDraft, SimilarIssue, SourceHost,
};
use triage_core::report::BugReport;
use triage_core::workflow::{workflow_id, WorkflowRecord, WorkflowResult, WorkflowStatus};

const SIMILAR_ISSUE_LIMIT: usize = 5;

/// External services a workflow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn LanguageModel>,
    pub tracker: Arc<dyn IssueTracker>,
    pub host: Arc<dyn SourceHost>,
}

pub struct WorkflowOrchestrator {
    normalizer: ReportNormalizer,
    assembler: CodeContextAssembler,
    model: Arc<dyn LanguageModel>,
    tracker: Arc<dyn IssueTracker>,
    host: Arc<dyn SourceHost>,
    store: Arc<dyn WorkflowStore>,
}

/// Outcome of trying to turn a fix proposal into a pull request.
enum Publication {
    Opened(String),
    NothingToApply,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WorkflowOrchestrator {
    pub fn new(collaborators: Collaborators, store: Arc<dyn WorkflowStore>) -> Self {
        Self::with_context_config(collaborators, store, ContextConfig::default())
    }

    pub fn with_context_config(
        collaborators: Collaborators,
        store: Arc<dyn WorkflowStore>,
        context_config: ContextConfig,
    ) -> Self {
        let Collaborators {
            model,
            tracker,
            host,
        } = collaborators;
        Self {
            normalizer: ReportNormalizer::new(Arc::clone(&model)),
            assembler: CodeContextAssembler::with_config(Arc::clone(&host), context_config),
            model,
            tracker,
            host,
            store,
        }
    }

    /// Pure read of a workflow's audit trail. `None` for unknown ids.
    pub fn get_status(&self, workflow_id: &str) -> Option<WorkflowRecord> {
        self.store.get(workflow_id)
    }

    pub async fn run(
        &self,
        conversation: &[ConversationMessage],
        channel_id: &str,
        thread_id: &str,
    ) -> WorkflowResult {
        let id = workflow_id(channel_id, thread_id);
        self.store.put(WorkflowRecord::new(id.clone()));
        tracing::info!(workflow_id = %id, messages = conversation.len(), "workflow started");

        let outcome = AssertUnwindSafe(self.execute(&id, conversation))
            .catch_unwind()
            .await;
        let error = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(err)) => err,
            Err(payload) => WorkflowError::Panicked(panic_message(payload)),
        };

        tracing::error!(workflow_id = %id, error = %error, "workflow failed");
        if let Err(err) =
            self.store
                .append_step(&id, WorkflowStatus::Failed, json!({ "error": error.to_string() }))
        {
            tracing::warn!(workflow_id = %id, error = %err, "could not record failure");
        }
        WorkflowResult::failed(id, &error)
    }

    fn advance(
        &self,
        id: &str,
        status: WorkflowStatus,
        data: serde_json::Value,
    ) -> Result<(), WorkflowError> {
        self.store.append_step(id, status, data)?;
        tracing::info!(workflow_id = %id, status = %status, "{}", status.status_text());
        Ok(())
    }

    async fn execute(
        &self,
        id: &str,
        conversation: &[ConversationMessage],
    ) -> Result<WorkflowResult, WorkflowError> {
        self.advance(id, WorkflowStatus::ParsingBugReport, serde_json::Value::Null)?;
        let report = self.normalizer.normalize(conversation).await;
        if report.title.trim().is_empty() {
            return Err(WorkflowError::ReportParse(
                "normalized report has an empty title".to_string(),
            ));
        }
        self.advance(
            id,
            WorkflowStatus::BugReportParsed,
            json!({ "title": report.title, "severity": report.severity }),
        )?;

        let similar_issues = self.find_similar(&report.title).await;

        self.advance(
            id,
            WorkflowStatus::AnalyzingCodebase,
            json!({ "similar_issues": similar_issues.len() }),
        )?;
        let context = self.code_context(&report).await;

        self.advance(
            id,
            WorkflowStatus::GeneratingFix,
            json!({ "context_chars": context.chars().count() }),
        )?;
        let fix = match self.model.propose_fix(&report, &context).await {
            Ok(fix) => fix,
            Err(err) => {
                tracing::warn!(workflow_id = %id, error = %err, "fix proposal failed; manual fix required");
                FixProposal::manual_fix_required()
            }
        };
        self.advance(
            id,
            WorkflowStatus::FixGenerated,
            json!({ "files_to_change": fix.code_changes.len() }),
        )?;

        self.advance(id, WorkflowStatus::CreatingJiraTicket, serde_json::Value::Null)?;
        let issue_key = self
            .tracker
            .create_ticket(&report)
            .await
            .map_err(WorkflowError::TicketCreation)?;
        let issue_url = self.tracker.issue_url(&issue_key);
        self.advance(
            id,
            WorkflowStatus::JiraTicketCreated,
            json!({ "issue_key": issue_key, "issue_url": issue_url }),
        )?;

        let pr_url = if fix.has_code_changes() {
            self.advance(
                id,
                WorkflowStatus::CreatingPr,
                json!({ "files": fix.code_changes.len() }),
            )?;
            match self.publish_fix(&issue_key, &issue_url, &report, &fix).await {
                Ok(Publication::Opened(url)) => {
                    self.advance(id, WorkflowStatus::PrCreated, json!({ "pr_url": url }))?;
                    self.comment(&issue_key, &publish::pr_comment(&url)).await;
                    Some(url)
                }
                Ok(Publication::NothingToApply) => {
                    tracing::warn!(workflow_id = %id, "fix produced no file changes; no PR opened");
                    self.comment(&issue_key, publish::MANUAL_FIX_COMMENT).await;
                    None
                }
                Err(err) => {
                    tracing::warn!(workflow_id = %id, error = %err, "could not publish fix");
                    let text = format!(
                        "Automated fix could not be published: {}. Manual investigation required.",
                        err
                    );
                    self.comment(&issue_key, &text).await;
                    None
                }
            }
        } else {
            self.comment(&issue_key, publish::MANUAL_FIX_COMMENT).await;
            None
        };

        self.advance(
            id,
            WorkflowStatus::Completed,
            json!({ "issue_key": issue_key, "pr_url": pr_url }),
        )?;

        let message = match &pr_url {
            Some(url) => format!("Successfully created ticket {} and PR {}", issue_key, url),
            None => format!(
                "Successfully created ticket {} (manual fix required)",
                issue_key
            ),
        };
        Ok(WorkflowResult {
            success: true,
            workflow_id: id.to_string(),
            issue_key: Some(issue_key),
            issue_url: Some(issue_url),
            pr_url,
            title: Some(report.title),
            severity: Some(report.severity),
            similar_issues,
            error: None,
            message,
        })
    }

    /// Advisory only; failures mean "no similar issues".
    async fn find_similar(&self, title: &str) -> Vec<SimilarIssue> {
        match self.tracker.find_similar(title, SIMILAR_ISSUE_LIMIT).await {
            Ok(issues) => {
                if !issues.is_empty() {
                    let keys: Vec<&str> = issues.iter().map(|i| i.key.as_str()).collect();
                    tracing::info!(similar = ?keys, "found similar issues");
                }
                issues
            }
            Err(err) => {
                tracing::warn!(error = %err, "similar-issue search failed");
                Vec::new()
            }
        }
    }

    /// Context for the fix prompt. A panic inside assembly degrades to an empty context.
    async fn code_context(&self, report: &BugReport) -> String {
        let mut search_terms = keywords::extract(report);
        for component in &report.affected_components {
            if !search_terms.contains(component) {
                search_terms.push(component.clone());
            }
        }
        tracing::debug!(keywords = ?search_terms, "searching for code context");

        match AssertUnwindSafe(
            self.assembler
                .assemble(&search_terms, &report.affected_components),
        )
        .catch_unwind()
        .await
        {
            Ok(context) => context,
            Err(payload) => {
                tracing::warn!(panic = %panic_message(payload), "context assembly panicked");
                String::new()
            }
        }
    }

    async fn comment(&self, issue_key: &str, text: &str) {
        if let Err(err) = self.tracker.add_comment(issue_key, text).await {
            tracing::warn!(issue_key = %issue_key, error = %err, "failed to comment on ticket");
        }
    }

    async fn publish_fix(
        &self,
        issue_key: &str,
        issue_url: &str,
        report: &BugReport,
        fix: &FixProposal,
    ) -> Result<Publication, WorkflowError> {
        let base = self.host.default_branch().to_string();
        let branch = self
            .create_branch(&base, &publish::branch_name(issue_key, &report.title))
            .await?;

        let contents = self.resolve_changes(&branch, &fix.code_changes).await?;
        if contents.is_empty() {
            return Ok(Publication::NothingToApply);
        }
        for (path, content) in &contents {
            self.host
                .update_or_create_file(
                    path,
                    content,
                    &branch,
                    &publish::commit_message(issue_key, path),
                )
                .await
                .map_err(|source| WorkflowError::ApplyChange {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(branch = %branch, path = %path, "committed change");
        }

        let draft = PullRequestDraft {
            branch: branch.clone(),
            base,
            title: publish::pr_title(issue_key, &report.title),
            body: publish::pr_body(issue_key, issue_url, report, fix),
            labels: publish::pr_labels(report.severity),
        };
        let url = self
            .host
            .create_pull_request(&draft)
            .await
            .map_err(WorkflowError::PullRequest)?;
        Ok(Publication::Opened(url))
    }

    /// Create the fix branch, retrying once with a timestamp suffix if the name is taken.
    async fn create_branch(&self, base: &str, name: &str) -> Result<String, WorkflowError> {
        match self.host.create_branch(base, name).await {
            Ok(branch) => Ok(branch),
            Err(err) if err.is_conflict() => {
                let retry = publish::disambiguated_branch_name(name, chrono::Utc::now().timestamp());
                tracing::warn!(branch = %name, retry = %retry, "branch exists; retrying with suffix");
                self.host
                    .create_branch(base, &retry)
                    .await
                    .map_err(WorkflowError::BranchCreation)
            }
            Err(err) => Err(WorkflowError::BranchCreation(err)),
        }
    }

    /// Final content for every change, computed before anything is written so a
    /// conflicting patch leaves the branch untouched. Changes without a path or
    /// without content, and no-op patches, are dropped.
    async fn resolve_changes(
        &self,
        branch: &str,
        changes: &[FileChange],
    ) -> Result<Vec<(String, String)>, WorkflowError> {
        let mut resolved = Vec::with_capacity(changes.len());
        for change in changes {
            if change.path.trim().is_empty() {
                tracing::warn!("change has no file path; skipping");
                continue;
            }
            if change.content_or_patch.trim().is_empty() {
                tracing::warn!(path = %change.path, "change has no content; skipping");
                continue;
            }
            match change.encoding() {
                ChangeEncoding::FullContent => {
                    resolved.push((change.path.clone(), change.content_or_patch.clone()));
                }
                ChangeEncoding::Patch => {
                    let current = self
                        .host
                        .get_file(&change.path, branch)
                        .await
                        .map_err(|source| WorkflowError::ApplyChange {
                            path: change.path.clone(),
                            source,
                        })?
                        .map(|file| file.content)
                        .unwrap_or_default();
                    let patched = patch::try_apply(&current, &change.content_or_patch).map_err(
                        |err| WorkflowError::ApplyChange {
                            path: change.path.clone(),
                            source: CollaboratorError::Conflict(err.to_string()),
                        },
                    )?;
                    if patched == current {
                        tracing::warn!(path = %change.path, "patch produced no net change; skipping");
                        continue;
                    }
                    let hunks = patch::parse_hunks(&change.content_or_patch);
                    let (adds, removes) = hunks.iter().fold((0, 0), |acc, hunk| {
                        let (a, r) = hunk.summary();
                        (acc.0 + a, acc.1 + r)
                    });
                    tracing::info!(path = %change.path, hunks = hunks.len(), adds, removes, "patch applied");
                    resolved.push((change.path.clone(), patched));
                }
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests;
