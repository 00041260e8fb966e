//! Configuration for triage
//!
//! Layers, later wins: built-in defaults, `config.toml` (explicit path or
//! `<config_dir>/triage/config.toml`), environment variables. Secrets still
//! missing after that are looked up in the credential store.

use crate::credentials::{self, CredentialKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub jira: JiraSettings,
    pub github: GitHubSettings,
    pub anthropic: AnthropicSettings,
    pub workflow: WorkflowSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraSettings {
    /// Host name or full URL of the Jira site
    pub base_url: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub project_key: String,
    /// Preferred issue type; falls back to what the project offers
    pub issue_type: String,
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            email: None,
            api_token: None,
            project_key: "CCS".to_string(),
            issue_type: "Task".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// `owner/name`
    pub repo: Option<String>,
    pub default_branch: String,
    pub api_url: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token: None,
            repo: None,
            default_branch: "main".to_string(),
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    /// Code context embedded in the fix prompt is cut to this many characters
    pub max_context_chars: usize,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            api_url: DEFAULT_ANTHROPIC_URL.to_string(),
            max_context_chars: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub max_thread_messages: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_thread_messages: 50,
        }
    }
}

fn set_if_present(slot: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_option_if_present(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("triage"))
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Load the full layered configuration.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.fill_missing_secrets();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        set_option_if_present(&mut self.jira.base_url, var("JIRA_BASE_URL"));
        set_option_if_present(&mut self.jira.email, var("JIRA_EMAIL"));
        set_option_if_present(&mut self.jira.api_token, var("JIRA_API_TOKEN"));
        set_if_present(&mut self.jira.project_key, var("JIRA_PROJECT_KEY"));
        set_if_present(&mut self.jira.issue_type, var("JIRA_ISSUE_TYPE"));

        set_option_if_present(&mut self.github.token, var("GITHUB_TOKEN"));
        set_option_if_present(&mut self.github.repo, var("GITHUB_REPO"));
        set_if_present(&mut self.github.default_branch, var("GITHUB_DEFAULT_BRANCH"));

        set_option_if_present(&mut self.anthropic.api_key, var("ANTHROPIC_API_KEY"));
        set_if_present(&mut self.anthropic.model, var("ANTHROPIC_MODEL"));

        if let Some(raw) = var("MAX_THREAD_MESSAGES") {
            self.workflow.max_thread_messages = match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "MAX_THREAD_MESSAGES",
                        value: raw,
                    })
                }
            };
        }
        Ok(())
    }

    /// Pull secrets that neither the file nor the environment supplied from
    /// the credential store. Store failures are logged once and ignored.
    pub fn fill_missing_secrets(&mut self) {
        let slots = [
            (CredentialKind::GitHubToken, &mut self.github.token),
            (CredentialKind::JiraApiToken, &mut self.jira.api_token),
            (CredentialKind::AnthropicApiKey, &mut self.anthropic.api_key),
        ];
        for (kind, slot) in slots {
            if slot.is_some() {
                continue;
            }
            match credentials::get(kind) {
                Ok(value) => *slot = value,
                Err(err) => credentials::warn_keychain_error_once(kind.label(), &err),
            }
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::default_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/triage/config.toml".to_string())
    }
}
