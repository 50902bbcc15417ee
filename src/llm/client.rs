//! Async HTTP oracle client
//!
//! Model-agnostic client for Anthropic and OpenAI-compatible chat APIs
//! (DeepSeek, OpenAI, local gateways). It only turns prompts into text;
//! interpreting that text is the parser's job.

use crate::llm::oracle::{OracleError, OraclePrompt, TextOracle};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// API format type
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

const DEFAULT_MAX_TOKENS: u32 = 1024;
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(3);

/// Async LLM client for making API calls
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
    max_tokens: u32,
}

impl LlmClient {
    /// Create a new LLM client with explicit configuration
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let api_format = Self::detect_api_format(&api_url);
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
            api_format,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Use a client with a request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(client) = Client::builder().timeout(timeout).build() {
            self.client = client;
        }
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Detect API format from URL
    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }

    /// Create a client from environment variables
    ///
    /// Required: LLM_API_KEY
    /// Optional: LLM_API_URL (defaults to Anthropic API)
    /// Optional: LLM_MODEL (defaults to claude-3-haiku-20240307)
    pub fn from_env() -> Result<Self, OracleError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| OracleError::Unavailable("LLM_API_KEY not set".into()))?;
        let api_url = std::env::var("LLM_API_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".into());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "claude-3-haiku-20240307".into());

        Ok(Self::new(api_key, api_url, model))
    }

    pub fn api_format(&self) -> &ApiFormat {
        &self.api_format
    }

    /// Send a completion request to the LLM
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
        match self.api_format {
            ApiFormat::Anthropic => self.complete_anthropic(system, user).await,
            ApiFormat::OpenAI => self.complete_openai(system, user).await,
        }
    }

    async fn complete_anthropic(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.into(),
            messages: vec![Message {
                role: "user".into(),
                content: user.into(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let response = check_status(response).await?;

        let completion: AnthropicResponse = response.json().await.map_err(map_transport_error)?;

        completion
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }

    async fn complete_openai(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![
                Message {
                    role: "system".into(),
                    content: system.into(),
                },
                Message {
                    role: "user".into(),
                    content: user.into(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let response = check_status(response).await?;

        let completion: OpenAIResponse = response.json().await.map_err(map_transport_error)?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}

#[async_trait]
impl TextOracle for LlmClient {
    async fn generate(&self, prompt: &OraclePrompt) -> Result<String, OracleError> {
        tracing::debug!(model = %self.model, "sending oracle request");
        self.complete(&prompt.system, &prompt.user).await
    }

    /// Any HTTP answer (even 4xx) proves the endpoint is reachable
    async fn check_availability(&self) -> Result<(), OracleError> {
        self.client
            .get(&self.api_url)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    OracleError::Unavailable(e.to_string())
                } else {
                    map_transport_error(e)
                }
            })
    }
}

fn map_transport_error(e: reqwest::Error) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout(e.to_string())
    } else if e.is_connect() {
        OracleError::Unavailable(e.to_string())
    } else {
        OracleError::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OracleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 429 {
        return Err(OracleError::RateLimited);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OracleError::Http {
        status: status.as_u16(),
        body,
    })
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

// OpenAI-compatible API format (DeepSeek, OpenAI, etc.)
#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}
