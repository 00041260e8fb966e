//! Capability traits for the external collaborators.
//!
//! One narrow trait per collaborator. The engine only ever holds
//! `Arc<dyn Trait>`, so adapters and test fakes are interchangeable.

use crate::conversation::ConversationMessage;
use crate::error::CollaboratorError;
use crate::fix::FixProposal;
use crate::report::{BugReport, ReportPayload};
use serde::{Deserialize, Serialize};

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Existing ticket that looks like the one being filed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// A file fetched from the source host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
    /// Stored size in bytes as reported by the host
    pub size: u64,
}

/// A code-search hit, ranked by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMatch {
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Search strategies understood by the source host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeQuery {
    /// Exact file-name match
    Filename(String),
    /// Any of the given terms
    AnyOf(Vec<String>),
    /// Free-text search over the given terms
    Text(Vec<String>),
    /// Any file with one of the given extensions
    Extensions(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub branch: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Turn a conversation into a raw (unrepaired) report payload.
    async fn extract_report(
        &self,
        conversation: &[ConversationMessage],
    ) -> CollaboratorResult<ReportPayload>;

    async fn propose_fix(&self, report: &BugReport, context: &str)
        -> CollaboratorResult<FixProposal>;
}

#[async_trait::async_trait]
pub trait IssueTracker: Send + Sync {
    /// Returns the new ticket key.
    async fn create_ticket(&self, report: &BugReport) -> CollaboratorResult<String>;

    async fn add_comment(&self, issue_key: &str, text: &str) -> CollaboratorResult<()>;

    async fn find_similar(&self, title: &str, limit: usize)
        -> CollaboratorResult<Vec<SimilarIssue>>;

    /// Browser URL for a ticket.
    fn issue_url(&self, issue_key: &str) -> String;
}

#[async_trait::async_trait]
pub trait SourceHost: Send + Sync {
    fn default_branch(&self) -> &str;

    /// Create `name` from the head of `base`. An existing branch is a `Conflict`.
    async fn create_branch(&self, base: &str, name: &str) -> CollaboratorResult<String>;

    /// `Ok(None)` when the path does not exist at `git_ref`.
    async fn get_file(&self, path: &str, git_ref: &str) -> CollaboratorResult<Option<RepoFile>>;

    async fn update_or_create_file(
        &self,
        path: &str,
        content: &str,
        branch: &str,
        message: &str,
    ) -> CollaboratorResult<()>;

    /// Returns the pull request's URL.
    async fn create_pull_request(&self, draft: &PullRequestDraft) -> CollaboratorResult<String>;

    async fn search_code(&self, query: &CodeQuery) -> CollaboratorResult<Vec<CodeMatch>>;
}

#[async_trait::async_trait]
pub trait ChatChannel: Send + Sync {
    async fn post(&self, channel_id: &str, thread_id: &str, text: &str) -> CollaboratorResult<()>;
}
