use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionClient, CompletionError, CompletionRequest};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiClient {
    api_key: String,
    api_base: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CompletionError::MissingApiKey);
        }
        bearer_header(&api_key)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key,
            api_base: api_base.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer_header(&self.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_message {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt,
        });

        let body = ChatRequest {
            model: request.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages,
        };

        debug!(
            "Calling {} (model {}, prompt {} chars)",
            self.endpoint(),
            request.model,
            request.prompt.len()
        );
        let resp = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .map_err(transport_error)?;

        let status = resp.status();
        let text = resp.text().map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), text));
        }

        parse_chat_response(&text)
    }
}

fn bearer_header(api_key: &str) -> Result<HeaderValue, CompletionError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
        .map_err(|_| CompletionError::InvalidApiKey)?;
    value.set_sensitive(true);
    Ok(value)
}

fn transport_error(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Transport(e.to_string())
    }
}

/// Maps a non-success HTTP status to an error kind.
fn classify_status(status: u16, body: String) -> CompletionError {
    match status {
        429 if body.contains("insufficient_quota") => CompletionError::QuotaExceeded(body),
        429 => CompletionError::RateLimited(body),
        408 | 504 => CompletionError::Timeout,
        _ => CompletionError::Http { status, body },
    }
}

/// Extracts the first choice's text from a chat-completions body.
fn parse_chat_response(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Malformed("response has no choices".to_string()))?;

    if choice.finish_reason.as_deref() == Some("length") {
        debug!("Completion stopped at the token limit");
    }

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(CompletionError::EmptyCompletion),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
