//! Code context for the fix prompt
//!
//! Strategies run in order until enough files are collected:
//! 1. exact filename match for keywords that look like file names
//! 2. disjunction over component-like keywords (capitalized identifiers)
//! 3. free-text search over the leading keywords
//! 4. any file with one of the fallback extensions
//!
//! Full content of the top files is embedded. When no file qualifies, the
//! assembler falls back to short per-component references, and finally to a
//! sentinel so the prompt never silently loses its context section.

use std::collections::HashSet;
use std::sync::Arc;
use triage_core::protocol::{CodeMatch, CodeQuery, RepoFile, SourceHost};
use triage_core::util::truncate;

/// Returned when neither file search nor component lookup produced anything.
pub const NO_CONTEXT_FOUND: &str = "No specific code context found";

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Files collected across strategies
    pub max_files: usize,
    /// Files whose full content is embedded
    pub embed_files: usize,
    /// Larger files are skipped
    pub max_file_bytes: u64,
    pub component_file_bytes: u64,
    pub component_snippet_chars: usize,
    /// Search hits listed per component in the fallback
    pub component_references: usize,
    pub max_components: usize,
    pub component_terms: usize,
    pub text_terms: usize,
    pub fallback_extensions: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: 5,
            embed_files: 3,
            max_file_bytes: 200_000,
            component_file_bytes: 50_000,
            component_snippet_chars: 1000,
            component_references: 2,
            max_components: 5,
            component_terms: 2,
            text_terms: 3,
            fallback_extensions: vec!["tsx".to_string(), "ts".to_string()],
        }
    }
}

fn looks_like_file(keyword: &str) -> bool {
    let name = keyword.rsplit('/').next().unwrap_or(keyword);
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn looks_like_component(keyword: &str) -> bool {
    keyword.chars().count() > 3
        && keyword.chars().next().is_some_and(char::is_uppercase)
        && !looks_like_file(keyword)
}

fn file_name(keyword: &str) -> &str {
    keyword.rsplit('/').next().unwrap_or(keyword)
}

pub struct CodeContextAssembler {
    host: Arc<dyn SourceHost>,
    config: ContextConfig,
}

impl CodeContextAssembler {
    pub fn new(host: Arc<dyn SourceHost>) -> Self {
        Self::with_config(host, ContextConfig::default())
    }

    pub fn with_config(host: Arc<dyn SourceHost>, config: ContextConfig) -> Self {
        Self { host, config }
    }

    /// Build the context blob. Never empty.
    pub async fn assemble(&self, keywords: &[String], affected_components: &[String]) -> String {
        let candidates = self.relevant_files(keywords).await;
        let files = self.fetch_files(&candidates).await;
        if !files.is_empty() {
            tracing::info!(
                files = files.len(),
                candidates = candidates.len(),
                "assembled code context"
            );
            return files
                .iter()
                .map(|file| format!("=== COMPLETE FILE: {} ===\n{}", file.path, file.content))
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        let references = self.component_context(affected_components).await;
        if references.is_empty() {
            tracing::info!("no code context found");
            NO_CONTEXT_FOUND.to_string()
        } else {
            references
        }
    }

    fn strategies(&self, keywords: &[String]) -> Vec<CodeQuery> {
        let mut queries: Vec<CodeQuery> = keywords
            .iter()
            .filter(|k| looks_like_file(k))
            .map(|k| CodeQuery::Filename(file_name(k).to_string()))
            .collect();

        let components: Vec<String> = keywords
            .iter()
            .filter(|k| looks_like_component(k))
            .take(self.config.component_terms)
            .cloned()
            .collect();
        if !components.is_empty() {
            queries.push(CodeQuery::AnyOf(components));
        }

        let text: Vec<String> = keywords
            .iter()
            .take(self.config.text_terms)
            .cloned()
            .collect();
        if !text.is_empty() {
            queries.push(CodeQuery::Text(text));
        }

        if !self.config.fallback_extensions.is_empty() {
            queries.push(CodeQuery::Extensions(
                self.config.fallback_extensions.clone(),
            ));
        }
        queries
    }

    /// Up to `max_files` ranked candidates, deduplicated by path.
    async fn relevant_files(&self, keywords: &[String]) -> Vec<CodeMatch> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut collected = Vec::new();

        for query in self.strategies(keywords) {
            if collected.len() >= self.config.max_files {
                break;
            }
            let hits = match self.host.search_code(&query).await {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::warn!(?query, error = %err, "code search strategy failed");
                    continue;
                }
            };
            for hit in hits {
                if collected.len() >= self.config.max_files {
                    break;
                }
                if hit.size.is_some_and(|size| size > self.config.max_file_bytes) {
                    continue;
                }
                if seen.insert(hit.path.clone()) {
                    collected.push(hit);
                }
            }
        }
        collected
    }

    /// Contents of the leading candidates, skipping files that vanished or are too large.
    async fn fetch_files(&self, candidates: &[CodeMatch]) -> Vec<RepoFile> {
        let branch = self.host.default_branch().to_string();
        let mut files = Vec::new();
        for candidate in candidates {
            if files.len() >= self.config.embed_files {
                break;
            }
            match self.host.get_file(&candidate.path, &branch).await {
                Ok(Some(file)) if file.size <= self.config.max_file_bytes => files.push(file),
                Ok(Some(file)) => {
                    tracing::debug!(path = %file.path, size = file.size, "skipping oversized file")
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %candidate.path, error = %err, "failed to fetch file")
                }
            }
        }
        files
    }

    /// Short per-component context: a snippet for file-like components, otherwise
    /// the paths of the top search hits.
    async fn component_context(&self, components: &[String]) -> String {
        let branch = self.host.default_branch().to_string();
        let mut sections = Vec::new();

        for component in components.iter().take(self.config.max_components) {
            if looks_like_file(component) {
                if let Ok(Some(file)) = self.host.get_file(component, &branch).await {
                    if file.size < self.config.component_file_bytes {
                        sections.push(format!(
                            "=== {} ===\n{}",
                            file.path,
                            truncate(&file.content, self.config.component_snippet_chars)
                        ));
                    }
                }
                continue;
            }

            let query = CodeQuery::AnyOf(vec![component.clone()]);
            match self.host.search_code(&query).await {
                Ok(hits) => sections.extend(
                    hits.iter()
                        .take(self.config.component_references)
                        .map(|hit| format!("Reference in {}", hit.path)),
                ),
                Err(err) => {
                    tracing::warn!(component = %component, error = %err, "component lookup failed")
                }
            }
        }
        sections.join("\n\n")
    }
}
