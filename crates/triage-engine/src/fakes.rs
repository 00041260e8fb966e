//! In-memory collaborators for engine tests. Every call is recorded.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use triage_core::conversation::ConversationMessage;
use triage_core::error::CollaboratorError;
use triage_core::fix::FixProposal;
use triage_core::protocol::{
    ChatChannel, CodeMatch, CodeQuery, CollaboratorResult, IssueTracker, LanguageModel,
    PullRequestDraft, RepoFile, SimilarIssue, SourceHost,
};
use triage_core::report::{BugReport, ReportPayload};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct FakeModel {
    report: Option<CollaboratorResult<ReportPayload>>,
    fix: Option<CollaboratorResult<FixProposal>>,
    pub contexts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn with_report(mut self, report: CollaboratorResult<ReportPayload>) -> Self {
        self.report = Some(report);
        self
    }

    pub fn with_fix(mut self, fix: CollaboratorResult<FixProposal>) -> Self {
        self.fix = Some(fix);
        self
    }

    pub fn contexts(&self) -> Vec<String> {
        locked(&self.contexts).clone()
    }
}

#[async_trait::async_trait]
impl LanguageModel for FakeModel {
    async fn extract_report(
        &self,
        _conversation: &[ConversationMessage],
    ) -> CollaboratorResult<ReportPayload> {
        self.report
            .clone()
            .unwrap_or_else(|| Err(CollaboratorError::Malformed("no canned report".into())))
    }

    async fn propose_fix(
        &self,
        _report: &BugReport,
        context: &str,
    ) -> CollaboratorResult<FixProposal> {
        locked(&self.contexts).push(context.to_string());
        self.fix.clone().unwrap_or_else(|| Ok(FixProposal::default()))
    }
}

pub struct FakeTracker {
    pub key: String,
    pub create_error: Option<CollaboratorError>,
    pub similar: CollaboratorResult<Vec<SimilarIssue>>,
    pub comment_error: Option<CollaboratorError>,
    pub created: Mutex<Vec<BugReport>>,
    pub comments: Mutex<Vec<(String, String)>>,
}

impl Default for FakeTracker {
    fn default() -> Self {
        Self {
            key: "CCS-42".to_string(),
            create_error: None,
            similar: Ok(Vec::new()),
            comment_error: None,
            created: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
        }
    }
}

impl FakeTracker {
    pub fn comments(&self) -> Vec<(String, String)> {
        locked(&self.comments).clone()
    }

    pub fn created(&self) -> Vec<BugReport> {
        locked(&self.created).clone()
    }
}

#[async_trait::async_trait]
impl IssueTracker for FakeTracker {
    async fn create_ticket(&self, report: &BugReport) -> CollaboratorResult<String> {
        if let Some(err) = &self.create_error {
            return Err(err.clone());
        }
        locked(&self.created).push(report.clone());
        Ok(self.key.clone())
    }

    async fn add_comment(&self, issue_key: &str, text: &str) -> CollaboratorResult<()> {
        locked(&self.comments).push((issue_key.to_string(), text.to_string()));
        match &self.comment_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn find_similar(
        &self,
        _title: &str,
        limit: usize,
    ) -> CollaboratorResult<Vec<SimilarIssue>> {
        self.similar
            .clone()
            .map(|issues| issues.into_iter().take(limit).collect())
    }

    fn issue_url(&self, issue_key: &str) -> String {
        format!("https://jira.example.com/browse/{}", issue_key)
    }
}

#[derive(Default)]
pub struct FakeHost {
    pub files: Mutex<HashMap<String, String>>,
    pub existing_branches: Mutex<HashSet<String>>,
    pub always_conflict: bool,
    pub searches: HashMap<String, CollaboratorResult<Vec<CodeMatch>>>,
    pub panic_on_search: bool,
    pub pr_error: Option<CollaboratorError>,
    pub write_error: Option<CollaboratorError>,
    pub branch_attempts: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<CodeQuery>>,
    pub writes: Mutex<Vec<(String, String, String)>>,
    pub pull_requests: Mutex<Vec<PullRequestDraft>>,
}

/// Stable lookup key for a query in `FakeHost::searches`.
pub fn query_key(query: &CodeQuery) -> String {
    match query {
        CodeQuery::Filename(name) => format!("filename:{}", name),
        CodeQuery::AnyOf(terms) => format!("any:{}", terms.join("|")),
        CodeQuery::Text(terms) => format!("text:{}", terms.join(" ")),
        CodeQuery::Extensions(exts) => format!("ext:{}", exts.join(",")),
    }
}

pub fn hit(path: &str, size: u64) -> CodeMatch {
    CodeMatch {
        path: path.to_string(),
        size: Some(size),
    }
}

impl FakeHost {
    pub fn with_file(self, path: &str, content: &str) -> Self {
        locked(&self.files).insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_search(mut self, key: &str, result: CollaboratorResult<Vec<CodeMatch>>) -> Self {
        self.searches.insert(key.to_string(), result);
        self
    }

    pub fn with_existing_branch(self, name: &str) -> Self {
        locked(&self.existing_branches).insert(name.to_string());
        self
    }

    pub fn branch_attempts(&self) -> Vec<String> {
        locked(&self.branch_attempts).clone()
    }

    pub fn queries(&self) -> Vec<CodeQuery> {
        locked(&self.queries).clone()
    }

    pub fn writes(&self) -> Vec<(String, String, String)> {
        locked(&self.writes).clone()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestDraft> {
        locked(&self.pull_requests).clone()
    }
}

#[async_trait::async_trait]
impl SourceHost for FakeHost {
    fn default_branch(&self) -> &str {
        "main"
    }

    async fn create_branch(&self, _base: &str, name: &str) -> CollaboratorResult<String> {
        locked(&self.branch_attempts).push(name.to_string());
        let mut existing = locked(&self.existing_branches);
        if self.always_conflict || !existing.insert(name.to_string()) {
            return Err(CollaboratorError::Conflict(format!(
                "Reference refs/heads/{} already exists",
                name
            )));
        }
        Ok(name.to_string())
    }

    async fn get_file(&self, path: &str, _git_ref: &str) -> CollaboratorResult<Option<RepoFile>> {
        Ok(locked(&self.files).get(path).map(|content| RepoFile {
            path: path.to_string(),
            content: content.clone(),
            size: content.len() as u64,
        }))
    }

    async fn update_or_create_file(
        &self,
        path: &str,
        content: &str,
        branch: &str,
        _message: &str,
    ) -> CollaboratorResult<()> {
        if let Some(err) = &self.write_error {
            return Err(err.clone());
        }
        locked(&self.writes).push((path.to_string(), content.to_string(), branch.to_string()));
        Ok(())
    }

    async fn create_pull_request(&self, draft: &PullRequestDraft) -> CollaboratorResult<String> {
        if let Some(err) = &self.pr_error {
            return Err(err.clone());
        }
        let mut prs = locked(&self.pull_requests);
        prs.push(draft.clone());
        Ok(format!("https://github.com/acme/shop/pull/{}", prs.len()))
    }

    async fn search_code(&self, query: &CodeQuery) -> CollaboratorResult<Vec<CodeMatch>> {
        if self.panic_on_search {
            panic!("search index exploded");
        }
        locked(&self.queries).push(query.clone());
        self.searches
            .get(&query_key(query))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
pub struct FakeChat {
    pub posts: Mutex<Vec<(String, String, String)>>,
}

impl FakeChat {
    pub fn texts(&self) -> Vec<String> {
        locked(&self.posts)
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl ChatChannel for FakeChat {
    async fn post(&self, channel_id: &str, thread_id: &str, text: &str) -> CollaboratorResult<()> {
        locked(&self.posts).push((
            channel_id.to_string(),
            thread_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}
