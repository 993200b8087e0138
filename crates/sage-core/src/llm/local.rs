//! Local chat provider speaking the Ollama-style `/api/chat` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::ChatModel;
use super::types::{ChatMessage, ChatReply, ChatRole, ProviderError, ToolCall, ToolSpec};
use crate::models::ProviderKind;

pub struct LocalProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LocalProvider {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OllamaFunctionSpec,
}

#[derive(Serialize)]
struct OllamaFunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaResponseToolCall>,
}

#[derive(Deserialize)]
struct OllamaResponseToolCall {
    function: OllamaResponseFunctionCall,
}

#[derive(Deserialize)]
struct OllamaResponseFunctionCall {
    name: String,
    arguments: serde_json::Value,
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

#[async_trait]
impl ChatModel for LocalProvider {
    async fn chat(
        &self,
        memory: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatReply, ProviderError> {
        let messages = memory
            .iter()
            .map(|m| OllamaMessage {
                role: role_str(m.role),
                content: m.content.clone(),
            })
            .collect();

        let request = OllamaRequest {
            model: &self.model,
            messages,
            tools: tools
                .iter()
                .map(|t| OllamaTool {
                    kind: "function",
                    function: OllamaFunctionSpec {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.client_timeout_secs())
                } else {
                    ProviderError::Network(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("{status}: {body}")));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        if let Some(call) = parsed.message.tool_calls.into_iter().next() {
            return Ok(ChatReply::ToolCall(ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: call.function.name,
                arguments: call.function.arguments,
            }));
        }

        Ok(ChatReply::Text(parsed.message.content))
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Local
    }
}

impl LocalProvider {
    fn client_timeout_secs(&self) -> u64 {
        self.client
            .timeout()
            .map(|d| d.as_secs())
            .unwrap_or(120)
    }
}
