//! Jira REST (v2) implementation of `IssueTracker`

use crate::config::{ConfigError, JiraSettings};
use crate::http::{create_http_client, send_with_retry, REQUEST_TIMEOUT_SECS};
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::sync::OnceCell;
use triage_core::error::CollaboratorError;
use triage_core::protocol::{CollaboratorResult, IssueTracker, SimilarIssue};
use triage_core::report::{BugReport, Severity};
use triage_core::util::truncate;
use url::Url;

const SERVICE: &str = "Jira";
const MAX_CONTEXT_CHARS: usize = 2000;
const ISSUE_TYPE_FALLBACKS: [&str; 5] = ["Task", "Story", "Bug", "Epic", "Sub-task"];
const DEFAULT_ISSUE_TYPES: [&str; 4] = ["Task", "Story", "Bug", "Epic"];
const CODE_BLOCK: &str = "{code}";

pub fn priority_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Highest",
        Severity::High => "High",
        Severity::Medium => "Medium",
        Severity::Low => "Low",
    }
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("label regex is valid"))
}

/// Labels from component names; Jira labels cannot contain spaces.
pub fn component_labels(components: &[String]) -> Vec<String> {
    components
        .iter()
        .map(|component| label_pattern().replace_all(component, "_").into_owned())
        .filter(|label| !label.is_empty())
        .collect()
}

/// Preferred type when the project has it, else the first fallback it has,
/// else whatever it offers first, else `Task`.
pub fn choose_issue_type(preferred: &str, available: &[String]) -> String {
    let has = |name: &str| available.iter().any(|t| t == name);
    if !preferred.is_empty() && has(preferred) {
        return preferred.to_string();
    }
    ISSUE_TYPE_FALLBACKS
        .iter()
        .copied()
        .find(|&name| has(name))
        .map(str::to_string)
        .or_else(|| available.first().cloned())
        .unwrap_or_else(|| "Task".to_string())
}

/// Wiki-markup ticket description. Empty sections are left out.
pub fn format_description(report: &BugReport) -> String {
    let mut sections = Vec::new();
    let mut section = |heading: &str, body: &str| {
        if !body.trim().is_empty() {
            sections.push(format!("h3. {}\n{}", heading, body));
        }
    };

    section("Description", &report.description);
    section("Steps to Reproduce", &report.steps_to_reproduce);
    section("Expected Behavior", &report.expected_behavior);
    section("Actual Behavior", &report.actual_behavior);
    section(
        "Affected Components",
        &report
            .affected_components
            .iter()
            .map(|c| format!("* {}", c))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    let context = &report.additional_context;
    let context = if context.chars().count() > MAX_CONTEXT_CHARS {
        format!("{}...\n[Truncated]", truncate(context, MAX_CONTEXT_CHARS))
    } else {
        context.clone()
    };
    if !context.trim().is_empty() {
        section(
            "Additional Context",
            &format!("{}{}{}", CODE_BLOCK, context, CODE_BLOCK),
        );
    }

    sections.join("\n\n")
}

/// Quote a title for a JQL text search.
pub fn jql_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn similar_issues_jql(project_key: &str, title: &str) -> String {
    format!(
        "project = {} AND summary ~ \"{}\" ORDER BY created DESC",
        project_key,
        jql_escape(title)
    )
}

/// Accepts `acme.atlassian.net` as well as a full URL.
pub fn normalize_base_url(raw: &str) -> Option<Url> {
    let raw = raw.trim().trim_end_matches('/');
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    Url::parse(&with_scheme).ok()
}

#[derive(Serialize)]
struct NamedRef<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct ProjectRef<'a> {
    key: &'a str,
}

#[derive(Serialize)]
struct IssueFields<'a> {
    project: ProjectRef<'a>,
    summary: &'a str,
    description: String,
    issuetype: NamedRef<'a>,
    priority: NamedRef<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    fields: IssueFields<'a>,
}

#[derive(Deserialize)]
struct CreateIssueResponse {
    key: String,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Deserialize)]
struct ProjectResponse {
    #[serde(rename = "issueTypes", default)]
    issue_types: Vec<IssueTypeEntry>,
}

#[derive(Deserialize)]
struct IssueTypeEntry {
    name: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<SearchIssue>,
}

#[derive(Deserialize)]
struct SearchIssue {
    key: String,
    fields: SearchFields,
}

#[derive(Deserialize)]
struct SearchFields {
    #[serde(default)]
    summary: String,
    status: Option<StatusField>,
    created: Option<String>,
}

#[derive(Deserialize)]
struct StatusField {
    name: String,
}

pub struct JiraTracker {
    client: reqwest::Client,
    base_url: Url,
    email: String,
    api_token: String,
    project_key: String,
    preferred_issue_type: String,
    issue_type: OnceCell<String>,
}

impl JiraTracker {
    pub fn new(settings: &JiraSettings) -> Result<Self, ConfigError> {
        let raw_base = settings
            .base_url
            .as_deref()
            .ok_or(ConfigError::Missing("JIRA_BASE_URL"))?;
        let base_url = normalize_base_url(raw_base).ok_or_else(|| ConfigError::Invalid {
            key: "JIRA_BASE_URL",
            value: raw_base.to_string(),
        })?;
        let email = settings
            .email
            .clone()
            .ok_or(ConfigError::Missing("JIRA_EMAIL"))?;
        let api_token = settings
            .api_token
            .clone()
            .ok_or(ConfigError::Missing("JIRA_API_TOKEN"))?;
        let client = create_http_client(REQUEST_TIMEOUT_SECS).map_err(|e| ConfigError::Invalid {
            key: "http client",
            value: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            email,
            api_token,
            project_key: settings.project_key.clone(),
            preferred_issue_type: settings.issue_type.clone(),
            issue_type: OnceCell::new(),
        })
    }

    fn api_url(&self, segments: &[&str]) -> CollaboratorResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CollaboratorError::Malformed(format!("invalid Jira base URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["rest", "api", "2"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
    }

    /// Resolved once per tracker; lookup failures fall back to common types.
    async fn issue_type(&self) -> &str {
        self.issue_type
            .get_or_init(|| async {
                let available = match self.project_issue_types().await {
                    Ok(types) => types,
                    Err(err) => {
                        tracing::warn!(project = %self.project_key, error = %err, "could not list issue types");
                        DEFAULT_ISSUE_TYPES.iter().map(|t| t.to_string()).collect()
                    }
                };
                let chosen = choose_issue_type(&self.preferred_issue_type, &available);
                tracing::debug!(project = %self.project_key, issue_type = %chosen, "resolved issue type");
                chosen
            })
            .await
    }

    async fn project_issue_types(&self) -> CollaboratorResult<Vec<String>> {
        let url = self.api_url(&["project", self.project_key.as_str()])?;
        let project: ProjectResponse = send_with_retry(SERVICE, self.request(Method::GET, url))
            .await?
            .json(SERVICE)?;
        Ok(project.issue_types.into_iter().map(|t| t.name).collect())
    }
}

#[async_trait::async_trait]
impl IssueTracker for JiraTracker {
    async fn create_ticket(&self, report: &BugReport) -> CollaboratorResult<String> {
        let issue_type = self.issue_type().await;
        let request = CreateIssueRequest {
            fields: IssueFields {
                project: ProjectRef {
                    key: &self.project_key,
                },
                summary: &report.title,
                description: format_description(report),
                issuetype: NamedRef { name: issue_type },
                priority: NamedRef {
                    name: priority_name(report.severity),
                },
                labels: component_labels(&report.affected_components),
            },
        };
        let url = self.api_url(&["issue"])?;
        let created: CreateIssueResponse =
            send_with_retry(SERVICE, self.request(Method::POST, url).json(&request))
                .await?
                .json(SERVICE)?;
        tracing::info!(issue_key = %created.key, issue_type = %issue_type, "created ticket");
        Ok(created.key)
    }

    async fn add_comment(&self, issue_key: &str, text: &str) -> CollaboratorResult<()> {
        let url = self.api_url(&["issue", issue_key, "comment"])?;
        let request = self
            .request(Method::POST, url)
            .json(&CommentRequest { body: text });
        send_with_retry(SERVICE, request).await?;
        Ok(())
    }

    async fn find_similar(&self, title: &str, limit: usize) -> CollaboratorResult<Vec<SimilarIssue>> {
        let mut url = self.api_url(&["search"])?;
        url.query_pairs_mut()
            .append_pair("jql", &similar_issues_jql(&self.project_key, title))
            .append_pair("maxResults", &limit.to_string())
            .append_pair("fields", "key,summary,status,created");
        let response: SearchResponse = send_with_retry(SERVICE, self.request(Method::GET, url))
            .await?
            .json(SERVICE)?;
        Ok(response
            .issues
            .into_iter()
            .take(limit)
            .map(|issue| SimilarIssue {
                key: issue.key,
                summary: issue.fields.summary,
                status: issue
                    .fields
                    .status
                    .map(|s| s.name)
                    .unwrap_or_else(|| "Unknown".to_string()),
                created: issue.fields.created,
            })
            .collect())
    }

    fn issue_url(&self, issue_key: &str) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["browse", issue_key]);
        }
        url.to_string()
    }
}
