//! Shared HTTP plumbing: client construction, retry with backoff, and
//! mapping of HTTP failures onto `CollaboratorError`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use triage_core::error::CollaboratorError;
use triage_core::protocol::CollaboratorResult;
use triage_core::util::sanitize_response;

/// Rate limit retry configuration
pub const MAX_RETRIES: u32 = 3;
pub const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
pub const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Upper bound for a server-provided Retry-After we are willing to honour
const MAX_RETRY_AFTER_SECS: u64 = 300;

const USER_AGENT: &str = concat!("triage/", env!("CARGO_PKG_VERSION"));

/// Create a configured HTTP client
pub fn create_http_client(timeout_secs: u64) -> CollaboratorResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CollaboratorError::Network(format!("Failed to create HTTP client: {}", e)))
}

pub fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    let secs = ms / 1000;
    if secs == 0 {
        1
    } else {
        secs
    }
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn map_transport_error(service: &str, err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Network(format!("{} request timed out", service))
    } else if err.is_connect() {
        CollaboratorError::Network(format!("could not connect to {}", service))
    } else {
        CollaboratorError::Network(format!("{} request failed: {}", service, err))
    }
}

fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0 && *secs < MAX_RETRY_AFTER_SECS)
}

/// Error payload shapes returned by the APIs we talk to.
#[derive(Deserialize)]
#[serde(untagged)]
enum ApiErrorResponse {
    /// `{"message": "...", "errors": [{"message": "..."}]}`
    Described {
        message: String,
        #[serde(default)]
        errors: Vec<ApiErrorDetail>,
    },
    /// `{"type": "error", "error": {"type": "...", "message": "..."}}`
    Nested { error: NestedError },
    /// `{"errorMessages": [...], "errors": {"field": "..."}}`
    Listed {
        #[serde(rename = "errorMessages", default)]
        error_messages: Vec<String>,
        #[serde(default)]
        errors: HashMap<String, String>,
    },
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct NestedError {
    message: String,
}

/// Human-readable message from an error body. Unstructured bodies are sanitized.
pub fn error_message(body: &str) -> String {
    let structured = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(ApiErrorResponse::Described { message, errors }) => {
            match errors.into_iter().find_map(|e| e.message) {
                Some(detail) if !detail.is_empty() => format!("{}: {}", message, detail),
                _ => message,
            }
        }
        Ok(ApiErrorResponse::Nested { error }) => error.message,
        Ok(ApiErrorResponse::Listed {
            error_messages,
            errors,
        }) => {
            let mut parts = error_messages;
            let mut fields: Vec<_> = errors.into_iter().collect();
            fields.sort();
            parts.extend(fields.into_iter().map(|(field, msg)| format!("{}: {}", field, msg)));
            parts.join("; ")
        }
        Err(_) => String::new(),
    };

    if structured.trim().is_empty() {
        sanitize_response(body)
    } else {
        structured
    }
}

/// Map a non-success status onto the collaborator error taxonomy.
pub fn status_error(service: &str, status: u16, body: &str) -> CollaboratorError {
    let message = format!("{}: {}", service, error_message(body));
    match status {
        401 | 403 => CollaboratorError::Auth(message),
        404 => CollaboratorError::NotFound(message),
        409 => CollaboratorError::Conflict(message),
        422 if message.to_lowercase().contains("already exists") => {
            CollaboratorError::Conflict(message)
        }
        _ => CollaboratorError::Api { status, message },
    }
}

/// Successful response, body already read.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self, service: &str) -> CollaboratorResult<T> {
        parse_json(service, &self.body)
    }
}

pub fn parse_json<T: DeserializeOwned>(service: &str, body: &str) -> CollaboratorResult<T> {
    serde_json::from_str(body).map_err(|e| {
        CollaboratorError::Malformed(format!(
            "{} returned an unexpected payload ({}): {}",
            service,
            e,
            sanitize_response(body)
        ))
    })
}

/// Send `request`, retrying network errors, rate limits (429) and server
/// errors (5xx) with exponential backoff.
///
/// Returns the response body for 2xx statuses; every other status becomes a
/// `CollaboratorError` via [`status_error`].
pub async fn send_with_retry(
    service: &str,
    request: reqwest::RequestBuilder,
) -> CollaboratorResult<HttpResponse> {
    let mut retry_count = 0;

    loop {
        let attempt = request.try_clone().ok_or_else(|| {
            CollaboratorError::Malformed(format!("{} request body cannot be retried", service))
        })?;

        let response = match attempt.send().await {
            Ok(response) => response,
            Err(err) => {
                if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                    retry_count += 1;
                    let wait = backoff_secs(retry_count);
                    tracing::warn!(service, retry = retry_count, wait_secs = wait, error = %err, "request failed; retrying");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    continue;
                }
                return Err(map_transport_error(service, err));
            }
        };

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                    retry_count += 1;
                    tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                    continue;
                }
                return Err(map_transport_error(service, err));
            }
        };

        if status.is_success() {
            return Ok(HttpResponse {
                status: status.as_u16(),
                body,
            });
        }

        let retryable = status.as_u16() == 429 || status.is_server_error();
        if retryable && retry_count < MAX_RETRIES {
            retry_count += 1;
            let wait = retry_after.unwrap_or_else(|| backoff_secs(retry_count));
            tracing::warn!(service, status = status.as_u16(), retry = retry_count, wait_secs = wait, "retryable status; backing off");
            tokio::time::sleep(Duration::from_secs(wait)).await;
            continue;
        }

        let err = status_error(service, status.as_u16(), &body);
        tracing::debug!(service, status = status.as_u16(), error = %err, "request failed");
        return Err(err);
    }
}
