//! Anthropic Messages API implementation of `LanguageModel`

use crate::config::{AnthropicSettings, ConfigError};
use crate::http::{create_http_client, send_with_retry, REQUEST_TIMEOUT_SECS};
use crate::prompts;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use triage_core::conversation::ConversationMessage;
use triage_core::error::CollaboratorError;
use triage_core::fix::FixProposal;
use triage_core::parse::parse_structured_content;
use triage_core::protocol::{CollaboratorResult, LanguageModel};
use triage_core::report::{BugReport, ReportPayload};

const SERVICE: &str = "Anthropic";
const API_VERSION: &str = "2023-06-01";

/// Sampling parameters for one kind of call
#[derive(Debug, Clone, Copy, PartialEq)]
struct CallParams {
    temperature: f32,
    max_tokens: u32,
}

const REPORT_PARAMS: CallParams = CallParams {
    temperature: 0.3,
    max_tokens: 1000,
};

const FIX_PARAMS: CallParams = CallParams {
    temperature: 0.1,
    max_tokens: 4000,
};

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// First text block of a Messages API response.
fn response_text(body: &str) -> CollaboratorResult<String> {
    let response: MessagesResponse = crate::http::parse_json(SERVICE, body)?;
    if response.stop_reason.as_deref() == Some("max_tokens") {
        tracing::warn!("model response was cut off at max_tokens");
    }
    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .map(|block| block.text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| CollaboratorError::Malformed("response contained no text".to_string()))
}

pub struct AnthropicModel {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_context_chars: usize,
}

impl AnthropicModel {
    pub fn new(settings: &AnthropicSettings) -> Result<Self, ConfigError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;
        let client = create_http_client(REQUEST_TIMEOUT_SECS).map_err(|e| ConfigError::Invalid {
            key: "http client",
            value: e.to_string(),
        })?;
        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            api_key,
            model: settings.model.clone(),
            max_context_chars: settings.max_context_chars,
        })
    }

    async fn call<T: DeserializeOwned>(&self, prompt: &str, params: CallParams) -> CollaboratorResult<T> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let builder = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request);

        let response = send_with_retry(SERVICE, builder).await?;
        let text = response_text(&response.body)?;
        parse_structured_content(&text)
    }
}

#[async_trait::async_trait]
impl LanguageModel for AnthropicModel {
    async fn extract_report(
        &self,
        conversation: &[ConversationMessage],
    ) -> CollaboratorResult<ReportPayload> {
        tracing::debug!(messages = conversation.len(), model = %self.model, "extracting bug report");
        self.call(&prompts::report_prompt(conversation), REPORT_PARAMS)
            .await
    }

    async fn propose_fix(&self, report: &BugReport, context: &str) -> CollaboratorResult<FixProposal> {
        tracing::debug!(
            title = %report.title,
            context_chars = context.chars().count(),
            "requesting fix proposal"
        );
        let fix: FixProposal = self
            .call(
                &prompts::fix_prompt(report, context, self.max_context_chars),
                FIX_PARAMS,
            )
            .await?;
        tracing::info!(changes = fix.code_changes.len(), "fix proposal received");
        Ok(fix)
    }
}
