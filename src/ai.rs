use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{LookupError, LookupResult};

// --- Provider trait ---

/// A language-model backend. `complete` returns the raw completion text;
/// interpreting it is up to the caller.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> LookupResult<String>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Proxy,
    OpenAI,
    Anthropic,
}

pub fn resolve_provider(name: &str) -> Result<ProviderKind> {
    match name {
        "proxy" => Ok(ProviderKind::Proxy),
        "openai" | "gpt" => Ok(ProviderKind::OpenAI),
        "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
        _ => Err(anyhow!(
            "Unknown completion provider '{}'. Available: proxy (default), openai, anthropic",
            name
        )),
    }
}

pub fn create_provider(kind: ProviderKind, config: &Config) -> Result<Box<dyn CompletionService>> {
    match kind {
        ProviderKind::Proxy => {
            let api_key = config.openai_api_key.clone().unwrap_or_default();
            Ok(Box::new(ProxyCompletionClient::new(&config.completion_url, api_key)))
        }
        ProviderKind::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                anyhow!("OPENAI_API_KEY environment variable not set. Set it with: export OPENAI_API_KEY=your-key-here")
            })?;
            Ok(Box::new(OpenAIProvider::new(api_key, OPENAI_DEFAULT_MODEL.to_string())))
        }
        ProviderKind::Anthropic => {
            let api_key = config.anthropic_api_key.clone().ok_or_else(|| {
                anyhow!("ANTHROPIC_API_KEY environment variable not set. Set it with: export ANTHROPIC_API_KEY=your-key-here")
            })?;
            Ok(Box::new(AnthropicProvider::new(api_key, ANTHROPIC_DEFAULT_MODEL.to_string())))
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant that assists with employee selection based on relevance.";
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.3;

fn upstream_status(provider: &str, status: reqwest::StatusCode, body: &str) -> LookupError {
    LookupError::Upstream(format!(
        "{} request failed with status {}: {}",
        provider,
        status,
        body.chars().take(200).collect::<String>()
    ))
}

// --- Completion proxy ---

pub const DEFAULT_COMPLETION_URL: &str = "http://localhost:8080/api/openai-proxy";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyCompletionRequest<'a> {
    prompt: &'a str,
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProxyCompletionResponse {
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Client for the completion proxy. The proxy already extracts the id list
/// from the model's answer; it is handed back as JSON text so every provider
/// looks the same to the caller.
#[derive(Debug)]
pub struct ProxyCompletionClient {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ProxyCompletionClient {
    pub fn new(url: &str, api_key: String) -> Self {
        Self {
            url: url.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionService for ProxyCompletionClient {
    async fn complete(&self, prompt: &str) -> LookupResult<String> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&ProxyCompletionRequest {
                prompt,
                api_key: &self.api_key,
            })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<ProxyCompletionResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(text);
            return Err(upstream_status("Completion proxy", status, &detail));
        }

        let parsed: ProxyCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| LookupError::Parse(format!("invalid completion proxy response: {}", e)))?;
        match (parsed.result, parsed.error) {
            (Some(result), _) => Ok(result.to_string()),
            (None, Some(error)) => Err(LookupError::Upstream(error)),
            (None, None) => Err(LookupError::Parse("completion proxy response has no result".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "proxy"
    }
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model_id: String) -> Self {
        Self {
            api_key,
            model_id,
            url: ANTHROPIC_API_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[async_trait]
impl CompletionService for AnthropicProvider {
    async fn complete(&self, prompt: &str) -> LookupResult<String> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(upstream_status("Anthropic API", status, &error_text));
        }

        let api_response: AnthropicResponse = response.json().await?;

        api_response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| LookupError::Parse("No content in Anthropic API response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<OpenAIMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    url: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(api_key: String, model_id: String) -> Self {
        Self {
            api_key,
            model_id,
            url: OPENAI_API_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[async_trait]
impl CompletionService for OpenAIProvider {
    async fn complete(&self, prompt: &str) -> LookupResult<String> {
        let request = OpenAIRequest {
            model: self.model_id.clone(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(upstream_status("OpenAI API", status, &error_text));
        }

        let api_response: OpenAIResponse = response.json().await?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LookupError::Parse("No content in OpenAI API response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
