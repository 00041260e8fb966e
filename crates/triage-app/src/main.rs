//! triage - turn a chat bug-report thread into a ticket and a fix PR
//!
//! Reads a conversation (JSON array of `{author, text, timestamp}`), runs the
//! workflow against Jira, GitHub and Anthropic, and prints the result as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use triage_adapters::credentials::{self, CredentialKind};
use triage_adapters::{AnthropicModel, Config, GitHubHost, JiraTracker};
use triage_core::conversation::ConversationMessage;
use triage_core::protocol::{ChatChannel, CollaboratorResult};
use triage_engine::{
    Collaborators, DispatchOutcome, InMemoryWorkflowStore, ThreadDispatcher, WorkflowOrchestrator,
};

#[derive(Parser, Debug)]
#[command(
    name = "triage",
    about = "Turn a chat bug report into a Jira ticket and a GitHub fix PR",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one conversation end to end
    Run {
        /// JSON file with the thread's messages, or `-` for stdin
        #[arg(long)]
        conversation: String,

        /// Chat channel id
        #[arg(long)]
        channel: String,

        /// Thread id (a fresh id is generated when omitted)
        #[arg(long)]
        thread: Option<String>,

        /// Text of the mention; used when the thread has no messages
        #[arg(long, default_value = "")]
        mention: String,

        /// Author of the mention
        #[arg(long, default_value = "user")]
        author: String,

        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Store a secret (read from stdin) in the credential store
    StoreCredential {
        #[arg(value_enum)]
        kind: SecretKind,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SecretKind {
    Github,
    Jira,
    Anthropic,
}

impl From<SecretKind> for CredentialKind {
    fn from(kind: SecretKind) -> Self {
        match kind {
            SecretKind::Github => CredentialKind::GitHubToken,
            SecretKind::Jira => CredentialKind::JiraApiToken,
            SecretKind::Anthropic => CredentialKind::AnthropicApiKey,
        }
    }
}

/// Chat sink for the CLI: status posts go to stderr, stdout stays JSON-only.
struct ConsoleChat;

#[async_trait::async_trait]
impl ChatChannel for ConsoleChat {
    async fn post(&self, channel_id: &str, thread_id: &str, text: &str) -> CollaboratorResult<()> {
        eprintln!("[{} / {}]\n{}\n", channel_id, thread_id, text);
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_conversation(source: &str) -> Result<Vec<ConversationMessage>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read conversation from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read conversation file {}", source))?
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).context("Conversation must be a JSON array of messages")
}

fn build_dispatcher(config: &Config) -> Result<ThreadDispatcher> {
    let collaborators = Collaborators {
        model: Arc::new(AnthropicModel::new(&config.anthropic)?),
        tracker: Arc::new(JiraTracker::new(&config.jira)?),
        host: Arc::new(GitHubHost::new(&config.github)?),
    };
    let orchestrator =
        WorkflowOrchestrator::new(collaborators, Arc::new(InMemoryWorkflowStore::new()));
    Ok(ThreadDispatcher::new(Arc::new(orchestrator), Arc::new(ConsoleChat))
        .with_max_messages(config.workflow.max_thread_messages))
}

async fn run(
    conversation: &str,
    channel: &str,
    thread: Option<String>,
    mention: &str,
    author: &str,
    config_path: Option<&Path>,
) -> Result<ExitCode> {
    let config = Config::load(config_path)?;
    let history = read_conversation(conversation)?;
    let thread = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let dispatcher = build_dispatcher(&config)?;

    match dispatcher
        .handle(channel, &thread, author, mention, history)
        .await
    {
        DispatchOutcome::Finished(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        DispatchOutcome::NeedsContext => {
            tracing::warn!("conversation and mention were both empty; nothing to process");
            Ok(ExitCode::FAILURE)
        }
        DispatchOutcome::AlreadyRunning => Ok(ExitCode::FAILURE),
    }
}

fn store_credential(kind: SecretKind) -> Result<ExitCode> {
    let kind = CredentialKind::from(kind);
    eprintln!(
        "  Paste the {} and press Enter (stored in your {}):",
        kind.label(),
        credentials::credentials_store_label()
    );
    let mut secret = String::new();
    std::io::stdin()
        .read_line(&mut secret)
        .context("Failed to read secret from stdin")?;

    credentials::set(kind, &secret).map_err(|e| {
        anyhow::anyhow!(
            "Failed to store {}: {}. You can set {} instead.",
            kind.label(),
            e,
            kind.env_var()
        )
    })?;
    eprintln!("  + {} saved", kind.label());
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    match Args::parse().command {
        Command::Run {
            conversation,
            channel,
            thread,
            mention,
            author,
            config,
        } => {
            run(
                &conversation,
                &channel,
                thread,
                &mention,
                &author,
                config.as_deref(),
            )
            .await
        }
        Command::StoreCredential { kind } => store_credential(kind),
    }
}
