//! GitHub REST implementation of `SourceHost`
//!
//! File contents are read with the raw media type and written through the git
//! data API (tree, commit, ref update), so no payload ever needs base64.

use crate::config::{ConfigError, GitHubSettings};
use crate::http::{create_http_client, send_with_retry, REQUEST_TIMEOUT_SECS};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use triage_core::error::CollaboratorError;
use triage_core::protocol::{
    CodeMatch, CodeQuery, CollaboratorResult, PullRequestDraft, RepoFile, SourceHost,
};
use url::Url;

const SERVICE: &str = "GitHub";
const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const SEARCH_PAGE_SIZE: &str = "10";
const FILE_MODE: &str = "100644";

/// Extract owner and repo from `owner/name` or a GitHub remote URL.
///
/// Supports:
/// - owner/repo
/// - git@github.com:owner/repo.git
/// - https://github.com/owner/repo(.git)
pub fn parse_repo_slug(raw: &str) -> Option<(String, String)> {
    let raw = raw.trim();
    let path = if let Some(rest) = raw.strip_prefix("git@github.com:") {
        rest.to_string()
    } else if raw.contains("://") {
        let parsed = Url::parse(raw).ok()?;
        if parsed.host_str() != Some("github.com") {
            return None;
        }
        parsed.path().trim_start_matches('/').to_string()
    } else {
        raw.to_string()
    };

    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// GitHub search syntax for a code query, scoped to one repository.
pub fn search_query(query: &CodeQuery, owner: &str, repo: &str) -> String {
    let terms = match query {
        CodeQuery::Filename(name) => format!("filename:{}", name),
        CodeQuery::AnyOf(terms) => terms.join(" OR "),
        CodeQuery::Text(terms) => terms.join(" "),
        CodeQuery::Extensions(exts) => exts
            .iter()
            .map(|ext| format!("extension:{}", ext))
            .collect::<Vec<_>>()
            .join(" "),
    };
    format!("{} repo:{}/{}", terms, owner, repo)
}

#[derive(Deserialize)]
struct RefResponse {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: GitObject,
}

#[derive(Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntry<'a>>,
}

#[derive(Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: [&'a str; 1],
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct CreatePrRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Deserialize)]
struct CreatePrResponse {
    html_url: String,
    number: u64,
}

#[derive(Serialize)]
struct LabelsRequest<'a> {
    labels: &'a [String],
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    path: String,
}

pub struct GitHubHost {
    client: reqwest::Client,
    api_base: Url,
    token: String,
    owner: String,
    repo: String,
    default_branch: String,
}

impl GitHubHost {
    pub fn new(settings: &GitHubSettings) -> Result<Self, ConfigError> {
        let token = settings
            .token
            .clone()
            .ok_or(ConfigError::Missing("GITHUB_TOKEN"))?;
        let raw_repo = settings
            .repo
            .as_deref()
            .ok_or(ConfigError::Missing("GITHUB_REPO"))?;
        let (owner, repo) = parse_repo_slug(raw_repo).ok_or_else(|| ConfigError::Invalid {
            key: "GITHUB_REPO",
            value: raw_repo.to_string(),
        })?;
        let api_base = Url::parse(&settings.api_url).map_err(|_| ConfigError::Invalid {
            key: "github.api_url",
            value: settings.api_url.clone(),
        })?;
        let client = create_http_client(REQUEST_TIMEOUT_SECS).map_err(|e| ConfigError::Invalid {
            key: "http client",
            value: e.to_string(),
        })?;

        Ok(Self {
            client,
            api_base,
            token,
            owner,
            repo,
            default_branch: settings.default_branch.clone(),
        })
    }

    /// `<api>/repos/<owner>/<repo>/<tail>`; slashes inside `tail` stay separators.
    fn repo_url(&self, tail: &[&str]) -> CollaboratorResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CollaboratorError::Malformed(format!("invalid API base URL {}", self.api_base))
            })?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(
                tail.iter()
                    .flat_map(|part| part.split('/'))
                    .filter(|segment| !segment.is_empty()),
            );
        Ok(url)
    }

    fn search_url(&self) -> CollaboratorResult<Url> {
        self.api_base.join("search/code").map_err(|e| {
            CollaboratorError::Malformed(format!("invalid API base URL {}: {}", self.api_base, e))
        })
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.request_accepting(method, url, JSON_MEDIA_TYPE)
    }

    fn request_accepting(&self, method: Method, url: Url, accept: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", accept)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn branch_head(&self, branch: &str) -> CollaboratorResult<String> {
        let url = self.repo_url(&["git", "ref", "heads", branch])?;
        let response = send_with_retry(SERVICE, self.request(Method::GET, url)).await?;
        let parsed: RefResponse = response.json(SERVICE)?;
        Ok(parsed.object.sha)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> CollaboratorResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(&["issues", number.to_string().as_str(), "labels"])?;
        let request = self
            .request(Method::POST, url)
            .json(&LabelsRequest { labels });
        send_with_retry(SERVICE, request).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl SourceHost for GitHubHost {
    fn default_branch(&self) -> &str {
        &self.default_branch
    }

    async fn create_branch(&self, base: &str, name: &str) -> CollaboratorResult<String> {
        let sha = self.branch_head(base).await?;
        let url = self.repo_url(&["git", "refs"])?;
        let request = self.request(Method::POST, url).json(&CreateRefRequest {
            git_ref: format!("refs/heads/{}", name),
            sha: &sha,
        });
        send_with_retry(SERVICE, request).await?;
        tracing::info!(branch = %name, base = %base, "created branch");
        Ok(name.to_string())
    }

    async fn get_file(&self, path: &str, git_ref: &str) -> CollaboratorResult<Option<RepoFile>> {
        let mut url = self.repo_url(&["contents", path])?;
        url.query_pairs_mut().append_pair("ref", git_ref);
        let request = self.request_accepting(Method::GET, url, RAW_MEDIA_TYPE);
        match send_with_retry(SERVICE, request).await {
            Ok(response) => Ok(Some(RepoFile {
                path: path.to_string(),
                size: response.body.len() as u64,
                content: response.body,
            })),
            Err(CollaboratorError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn update_or_create_file(
        &self,
        path: &str,
        content: &str,
        branch: &str,
        message: &str,
    ) -> CollaboratorResult<()> {
        let head = self.branch_head(branch).await?;

        let url = self.repo_url(&["git", "commits", head.as_str()])?;
        let commit: CommitResponse = send_with_retry(SERVICE, self.request(Method::GET, url))
            .await?
            .json(SERVICE)?;

        let url = self.repo_url(&["git", "trees"])?;
        let request = self.request(Method::POST, url).json(&CreateTreeRequest {
            base_tree: &commit.tree.sha,
            tree: vec![TreeEntry {
                path,
                mode: FILE_MODE,
                kind: "blob",
                content,
            }],
        });
        let tree: ShaResponse = send_with_retry(SERVICE, request).await?.json(SERVICE)?;

        let url = self.repo_url(&["git", "commits"])?;
        let request = self.request(Method::POST, url).json(&CreateCommitRequest {
            message,
            tree: &tree.sha,
            parents: [&commit.sha],
        });
        let new_commit: ShaResponse = send_with_retry(SERVICE, request).await?.json(SERVICE)?;

        let url = self.repo_url(&["git", "refs", "heads", branch])?;
        let request = self.request(Method::PATCH, url).json(&UpdateRefRequest {
            sha: &new_commit.sha,
            force: false,
        });
        send_with_retry(SERVICE, request).await?;
        tracing::debug!(path = %path, branch = %branch, commit = %new_commit.sha, "committed file");
        Ok(())
    }

    async fn create_pull_request(&self, draft: &PullRequestDraft) -> CollaboratorResult<String> {
        let url = self.repo_url(&["pulls"])?;
        let request = self.request(Method::POST, url).json(&CreatePrRequest {
            title: &draft.title,
            body: &draft.body,
            head: &draft.branch,
            base: &draft.base,
        });
        let pr: CreatePrResponse = send_with_retry(SERVICE, request).await?.json(SERVICE)?;

        // Labels are best-effort; the PR already exists.
        if let Err(err) = self.add_labels(pr.number, &draft.labels).await {
            tracing::warn!(pr = pr.number, error = %err, "failed to label pull request");
        }
        Ok(pr.html_url)
    }

    async fn search_code(&self, query: &CodeQuery) -> CollaboratorResult<Vec<CodeMatch>> {
        let mut url = self.search_url()?;
        url.query_pairs_mut()
            .append_pair("q", &search_query(query, &self.owner, &self.repo))
            .append_pair("per_page", SEARCH_PAGE_SIZE);
        let response: SearchResponse = send_with_retry(SERVICE, self.request(Method::GET, url))
            .await?
            .json(SERVICE)?;
        Ok(response
            .items
            .into_iter()
            .map(|item| CodeMatch {
                path: item.path,
                size: None,
            })
            .collect())
    }
}
