//! Chat-completion client for prediction synthesis.
//!
//! One provider at a time (Anthropic in production, OpenAI as the drop-in
//! alternative), with retry and exponential backoff on transient provider
//! errors. Hard errors after retries surface as [`LlmError::Exhausted`] so
//! the caller can switch to its fallback model.

use std::env;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_RETRIES: usize = 5;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{0} is not set")]
    MissingCredentials(&'static str),
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("missing text in provider response")]
    EmptyResponse,
    #[error("provider unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAi => "openai",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "anthropic" => Some(LlmProvider::Anthropic),
            "openai" => Some(LlmProvider::OpenAi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    api_key: String,
    base_url: Option<String>,
}

impl LlmClient {
    /// Build a client for the given provider, reading credentials from the
    /// environment. Credentials are read here and nowhere else.
    pub fn from_env(provider: LlmProvider) -> Result<Self> {
        let api_key = match provider {
            LlmProvider::Anthropic => read_api_key("ANTHROPIC_API_KEY", "sk-ant-")?,
            LlmProvider::OpenAi => read_api_key("OPENAI_API_KEY", "sk-")?,
        };
        let base_url = match provider {
            LlmProvider::OpenAi => env::var("OPENAI_BASE_URL").ok(),
            LlmProvider::Anthropic => None,
        };
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            provider,
            api_key,
            base_url,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Send a chat request to `model`, retrying transient failures
    /// (429, 5xx, transport errors) with exponential backoff.
    pub async fn chat(&self, model: &str, req: &LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0usize;
        let mut last_error = String::new();
        while attempt <= MAX_RETRIES {
            attempt += 1;
            match self.chat_once(model, req).await {
                Ok(response) => return Ok(response),
                Err(err) if is_transient(&err) => {
                    last_error = err.to_string();
                    let wait = backoff_delay(attempt, retry_after(&err));
                    tracing::warn!(
                        provider = self.provider.as_str(),
                        model,
                        attempt,
                        wait_secs = wait.as_secs(),
                        error = %last_error,
                        "transient provider error, backing off"
                    );
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(LlmError::Exhausted {
            attempts: attempt,
            last: last_error,
        })
    }

    async fn chat_once(&self, model: &str, req: &LlmRequest) -> Result<LlmResponse> {
        match self.provider {
            LlmProvider::Anthropic => self.chat_anthropic(model, req).await,
            LlmProvider::OpenAi => self.chat_openai(model, req).await,
        }
    }

    async fn chat_anthropic(&self, model: &str, req: &LlmRequest) -> Result<LlmResponse> {
        let mut payload = json!({
            "model": model,
            "max_tokens": req.max_tokens.max(1),
            "temperature": req.temperature,
            "messages": [ { "role": "user", "content": req.user } ],
        });
        if let Some(system) = &req.system {
            payload["system"] = json!(system);
        }
        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(provider_error(status, response).await);
        }
        let parsed: AnthropicResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or(LlmError::EmptyResponse)?;
        let usage = parsed.usage.unwrap_or_default();
        Ok(LlmResponse {
            content: text,
            model: model.to_string(),
            prompt_tokens: usage.input_tokens.unwrap_or(0),
            completion_tokens: usage.output_tokens.unwrap_or(0),
        })
    }

    async fn chat_openai(&self, model: &str, req: &LlmRequest) -> Result<LlmResponse> {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": model,
            "messages": messages,
            "max_tokens": req.max_tokens.max(1),
            "temperature": req.temperature,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(provider_error(status, response).await);
        }
        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        let usage = parsed.usage.unwrap_or_default();
        Ok(LlmResponse {
            content: text,
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }
}

async fn provider_error(status: StatusCode, response: reqwest::Response) -> LlmError {
    let body = response.text().await.unwrap_or_default();
    LlmError::Provider {
        status: status.as_u16(),
        body: truncate(&body, 400),
    }
}

fn is_transient(err: &LlmError) -> bool {
    match err {
        LlmError::Provider { status, .. } => *status == 429 || *status >= 500,
        LlmError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        _ => false,
    }
}

fn retry_after(err: &LlmError) -> Option<u64> {
    // retry-after is folded into the body text we keep; providers that send
    // the header also send a machine-readable delay there. Fall back to
    // exponential backoff otherwise.
    if let LlmError::Provider { status: 429, body } = err {
        body.split_whitespace()
            .find_map(|word| word.trim_end_matches('s').parse::<u64>().ok())
            .filter(|secs| (1..=120).contains(secs))
    } else {
        None
    }
}

/// Exponential backoff: base 1 s, factor 2, capped at 64 s, unless the
/// provider supplied an explicit delay.
pub fn backoff_delay(attempt: usize, retry_after_secs: Option<u64>) -> Duration {
    if let Some(secs) = retry_after_secs {
        return Duration::from_secs(secs.max(1));
    }
    let capped = attempt.min(6) as u32;
    Duration::from_secs(1u64 << capped.saturating_sub(1))
}

fn read_api_key(var: &'static str, prefix: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| LlmError::MissingCredentials(var))?;
    if !value.starts_with(prefix) {
        return Err(LlmError::InvalidCredentials(format!(
            "{var} must start with '{prefix}'"
        )));
    }
    Ok(value)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Default, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Default, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay(1, None), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, None), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, None), Duration::from_secs(32));
    }

    #[test]
    fn explicit_retry_after_wins() {
        assert_eq!(backoff_delay(4, Some(7)), Duration::from_secs(7));
        assert_eq!(backoff_delay(4, Some(0)), Duration::from_secs(1));
    }

    #[test]
    fn rate_limit_is_transient() {
        assert!(is_transient(&LlmError::Provider {
            status: 429,
            body: String::new()
        }));
        assert!(is_transient(&LlmError::Provider {
            status: 503,
            body: String::new()
        }));
        assert!(!is_transient(&LlmError::Provider {
            status: 400,
            body: String::new()
        }));
        assert!(!is_transient(&LlmError::EmptyResponse));
    }

    #[test]
    fn provider_names_round_trip() {
        assert_eq!(LlmProvider::from_str("anthropic"), Some(LlmProvider::Anthropic));
        assert_eq!(LlmProvider::from_str("OPENAI"), Some(LlmProvider::OpenAi));
        assert_eq!(LlmProvider::from_str("mystery"), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "err £££££";
        let out = truncate(text, 5);
        assert!(out.chars().count() <= 6);
    }
}
