//! Ollama chat provider.
//!
//! Uses `/api/chat` so the system prompt travels as its own message.
//! API reference: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use cityhub_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: SamplingOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    message: ReplyMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// Client for a local or remote Ollama server.
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// `timeout` bounds each HTTP request; `None` waits indefinitely.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn chat_request<'a>(&self, request: &'a LlmRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &request.model,
            messages,
            format: request.wants_json().then_some("json"),
            options: SamplingOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            stream: false,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, json = request.wants_json(), "Ollama chat request");

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&self.chat_request(request))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Ollama unreachable at {}: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("Ollama returned {}: {}", status, detail)));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Unexpected Ollama reply: {}", e)))?;

        Ok(LlmResponse {
            content: reply.message.content,
            model: reply.model,
            usage: LlmUsage::new(reply.prompt_eval_count, reply.eval_count),
            truncated: reply.done_reason.as_deref() == Some("length"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OllamaClient {
        OllamaClient::new("http://gpu-box:11434/", None).unwrap()
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = client();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_system_prompt_becomes_first_message() {
        let request = LlmRequest::new("Is this relevant?", "llama3.2")
            .with_system("You are a grader")
            .with_temperature(0.0)
            .with_max_tokens(16)
            .with_json_output();

        let body = serde_json::to_value(client().chat_request(&request)).unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Is this relevant?");
        assert_eq!(body["format"], "json");
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["num_predict"], 16);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_plain_text_request_has_no_format() {
        let request = LlmRequest::new("Hello", "llama3.2");
        let body = serde_json::to_value(client().chat_request(&request)).unwrap();

        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body.get("format").is_none());
        assert!(body["options"].get("temperature").is_none());
    }

    #[test]
    fn test_reply_parsing() {
        let reply: ChatResponse = serde_json::from_str(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"{\"binary_score\":\"yes\"}"},"done":true,"done_reason":"stop","eval_count":7}"#,
        )
        .unwrap();

        assert_eq!(reply.message.content, r#"{"binary_score":"yes"}"#);
        assert_eq!(reply.prompt_eval_count, 0);
        assert_eq!(reply.eval_count, 7);
        assert_eq!(reply.done_reason.as_deref(), Some("stop"));
    }
}
