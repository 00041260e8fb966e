//! Runtime adapters for triage (config/auth, HTTP collaborators).

pub mod anthropic;
pub mod config;
pub mod credentials;
pub mod github;
pub mod http;
pub mod jira;
pub mod prompts;

pub use anthropic::AnthropicModel;
pub use config::{Config, ConfigError};
pub use github::GitHubHost;
pub use jira::JiraTracker;
