//! Provider-neutral completion interface.

use cityhub_core::AppResult;

/// Shape the model is asked to reply in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// A single JSON object; graders rely on this
    Json,
}

/// One non-streaming completion.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub format: ResponseFormat,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
            format: ResponseFormat::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Verdict prompts run at 0.0 so repeated runs agree.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.format = ResponseFormat::Json;
        self
    }

    pub fn wants_json(&self) -> bool {
        self.format == ResponseFormat::Json
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    /// Model that actually answered, as reported by the provider
    pub model: String,
    pub usage: LlmUsage,
    /// The reply stopped at the token limit
    pub truncated: bool,
}

/// Token counts reported by the provider; zero when it reports none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// A chat model behind some provider (Ollama, OpenAI, Groq).
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("Is this relevant?", "llama3")
            .with_system("You are a grader")
            .with_temperature(0.0)
            .with_max_tokens(16)
            .with_json_output();

        assert_eq!(request.system.as_deref(), Some("You are a grader"));
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(16));
        assert!(request.wants_json());
        assert!(!LlmRequest::new("hi", "llama3").wants_json());
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(LlmUsage::new(120, 30).total(), 150);
        assert_eq!(LlmUsage::new(u32::MAX, 1).total(), u32::MAX);
        assert_eq!(LlmUsage::default().total(), 0);
    }
}
