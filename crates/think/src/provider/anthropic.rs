//! Anthropic Messages API client.

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    ChatParams, ChatResponse, ContentBlock, Message, Provider, ProviderError, StopReason,
    ToolDefinition,
};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: if api_base.is_empty() {
                DEFAULT_API_BASE.to_string()
            } else {
                api_base.trim_end_matches('/').to_string()
            },
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: StopReason,
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError> {
        let max_tokens = if params.max_tokens == 0 {
            DEFAULT_MAX_TOKENS
        } else {
            params.max_tokens
        };

        let request = MessagesRequest {
            model: &params.model,
            max_tokens,
            system: &params.system,
            messages: &params.messages,
            tools: &params.tools,
        };

        tracing::debug!(model = %params.model, messages = params.messages.len(), "chat request");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(ChatResponse {
            content: parsed.content,
            stop_reason: parsed.stop_reason,
        })
    }
}
