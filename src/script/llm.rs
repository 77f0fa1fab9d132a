//! Language-model clients: one prompt in, narrative text out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PodcastError, Result};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// Transport and auth failures surface as `PodcastError::LlmUnavailable`;
/// implementations never retry.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("podcast-generator/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| PodcastError::Config(format!("building llm http client: {e}")))
}

/// Reads a non-success response into an `LlmUnavailable` with a short body excerpt.
async fn status_error(resp: reqwest::Response) -> PodcastError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(300).collect();
    PodcastError::llm(format!("HTTP {status}: {excerpt}"))
}

/// Anthropic Messages API.
pub struct AnthropicModel {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicModel {
    pub fn new(api_key: &str, model_override: Option<&str>, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PodcastError::Config(
                "missing ANTHROPIC_API_KEY for script generation".to_string(),
            ));
        }
        Ok(Self {
            http: http_client(timeout)?,
            api_key: api_key.trim().to_string(),
            model: model_override.unwrap_or(DEFAULT_ANTHROPIC_MODEL).to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: &'a [ChatMessage],
        }
        #[derive(Deserialize)]
        struct Resp {
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(rename = "type")]
            kind: String,
            text: Option<String>,
        }

        let req = Req {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: &request.messages,
        };
        let resp = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await
            .map_err(PodcastError::llm)?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body: Resp = resp.json().await.map_err(PodcastError::llm)?;
        let text = body
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(PodcastError::llm("empty completion"));
        }
        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

/// OpenAI Chat Completions API.
pub struct OpenAiModel {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(api_key: &str, model_override: Option<&str>, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PodcastError::Config(
                "missing OPENAI_API_KEY for script generation".to_string(),
            ));
        }
        Ok(Self {
            http: http_client(timeout)?,
            api_key: api_key.trim().to_string(),
            model: model_override.unwrap_or(DEFAULT_OPENAI_MODEL).to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(Msg {
            role: "system",
            content: &request.system,
        });
        for m in &request.messages {
            messages.push(Msg {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            });
        }
        let req = Req {
            model: &self.model,
            messages,
            temperature: 0.7,
            max_tokens: request.max_tokens,
        };

        let resp = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(PodcastError::llm)?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body: Resp = resp.json().await.map_err(PodcastError::llm)?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(PodcastError::llm("empty completion"));
        }
        Ok(content)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
