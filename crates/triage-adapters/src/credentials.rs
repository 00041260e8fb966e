//! Secret storage for the Jira, GitHub and Anthropic credentials
//!
//! All three secrets live in one JSON document so the system keychain prompts at
//! most once. On headless hosts (or with `TRIAGE_DISABLE_KEYRING=1`) the document
//! is a `credentials.json` next to the config file instead.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use thiserror::Error;

const KEYRING_SERVICE: &str = "triage-credentials";
const KEYRING_USERNAME: &str = "default";

/// Secrets the adapters can pull from the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    GitHubToken,
    JiraApiToken,
    AnthropicApiKey,
}

impl CredentialKind {
    /// Environment variable that takes precedence over the stored value.
    pub fn env_var(&self) -> &'static str {
        match self {
            CredentialKind::GitHubToken => "GITHUB_TOKEN",
            CredentialKind::JiraApiToken => "JIRA_API_TOKEN",
            CredentialKind::AnthropicApiKey => "ANTHROPIC_API_KEY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CredentialKind::GitHubToken => "GitHub token",
            CredentialKind::JiraApiToken => "Jira API token",
            CredentialKind::AnthropicApiKey => "Anthropic API key",
        }
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("could not determine where to keep the credentials file")]
    NoLocation,

    #[error("credentials file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored credentials are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("system keychain: {0}")]
    Keychain(#[from] keyring::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    github_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jira_api_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anthropic_api_key: Option<String>,
}

impl StoredCredentials {
    fn slot(&mut self, kind: CredentialKind) -> &mut Option<String> {
        match kind {
            CredentialKind::GitHubToken => &mut self.github_token,
            CredentialKind::JiraApiToken => &mut self.jira_api_token,
            CredentialKind::AnthropicApiKey => &mut self.anthropic_api_key,
        }
    }

    fn is_empty(&self) -> bool {
        self.github_token.is_none()
            && self.jira_api_token.is_none()
            && self.anthropic_api_key.is_none()
    }
}

/// Where the credential document is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    Keychain,
    File(PathBuf),
}

impl Backend {
    /// File backend when forced by env, under test, or when a populated file already
    /// exists; the system keychain otherwise.
    fn select() -> Result<Self, CredentialError> {
        let path = credentials_file()?;
        let forced = cfg!(test)
            || matches!(
                std::env::var("TRIAGE_DISABLE_KEYRING")
                    .unwrap_or_default()
                    .to_lowercase()
                    .as_str(),
                "1" | "true" | "yes"
            );
        if forced || matches!(read_file(&path), Ok(creds) if !creds.is_empty()) {
            Ok(Backend::File(path))
        } else {
            Ok(Backend::Keychain)
        }
    }

    fn load(&self) -> Result<StoredCredentials, CredentialError> {
        match self {
            Backend::File(path) => read_file(path),
            Backend::Keychain => {
                match Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)?.get_password() {
                    Ok(json) => Ok(serde_json::from_str(&json)?),
                    Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    fn save(&self, creds: &StoredCredentials) -> Result<(), CredentialError> {
        let json = serde_json::to_string(creds)?;
        match self {
            Backend::File(path) => write_file(path, &json),
            Backend::Keychain => {
                Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)?.set_password(&json)?;
                Ok(())
            }
        }
    }
}

fn credentials_file() -> Result<PathBuf, CredentialError> {
    match std::env::var("TRIAGE_CREDENTIALS_FILE") {
        Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
        _ if cfg!(test) => Ok(std::env::temp_dir().join("triage-test-credentials.json")),
        _ => dirs::config_dir()
            .map(|dir| dir.join("triage").join("credentials.json"))
            .ok_or(CredentialError::NoLocation),
    }
}

fn file_error(path: &Path) -> impl FnOnce(std::io::Error) -> CredentialError + '_ {
    move |source| CredentialError::File {
        path: path.to_path_buf(),
        source,
    }
}

fn read_file(path: &Path) -> Result<StoredCredentials, CredentialError> {
    match fs::read_to_string(path) {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StoredCredentials::default()),
        Err(err) => Err(file_error(path)(err)),
    }
}

/// Owner-only on unix; written to a sibling and renamed into place.
fn write_file(path: &Path, json: &str) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(file_error(parent))?;
    }
    let staged = path.with_extension("json.tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&staged).map_err(file_error(&staged))?;
    std::io::Write::write_all(&mut file, json.as_bytes()).map_err(file_error(&staged))?;
    fs::rename(&staged, path).map_err(file_error(path))
}

static CACHE: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYCHAIN_WARNED: AtomicBool = AtomicBool::new(false);

fn cache() -> MutexGuard<'static, Option<StoredCredentials>> {
    CACHE
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Human-friendly backend name for CLI messages.
pub fn credentials_store_label() -> &'static str {
    match Backend::select() {
        Ok(Backend::Keychain) => "system keychain",
        _ => "local credentials file",
    }
}

/// Log a credential-store failure once per process.
pub fn warn_keychain_error_once(context: &str, err: &CredentialError) {
    if KEYCHAIN_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!(
        context,
        error = %err,
        "couldn't read stored credentials; set the environment variable or TRIAGE_DISABLE_KEYRING=1 to bypass the keychain"
    );
}

/// Stored secret for `kind`, if any. The store is read once per process.
pub fn get(kind: CredentialKind) -> Result<Option<String>, CredentialError> {
    let mut cached = cache();
    if cached.is_none() {
        *cached = Some(Backend::select()?.load()?);
    }
    Ok(cached
        .as_mut()
        .and_then(|creds| creds.slot(kind).clone()))
}

/// Store a secret, keeping the other stored credentials intact.
pub fn set(kind: CredentialKind, value: &str) -> Result<(), CredentialError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CredentialError::Empty(kind.label()));
    }
    let backend = Backend::select()?;
    let mut creds = backend.load().unwrap_or_default();
    *creds.slot(kind) = Some(value.to_string());
    backend.save(&creds)?;
    *cache() = Some(creds);
    Ok(())
}

#[cfg(test)]
fn reset_for_tests() {
    *cache() = None;
    KEYCHAIN_WARNED.store(false, Ordering::Relaxed);
}
