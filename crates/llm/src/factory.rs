//! LLM provider factory.
//!
//! This module creates LLM clients from the provider name found in the
//! application configuration.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiCompatibleClient};
use crate::types::ProviderType;
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai", "groq")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key (required by the hosted providers)
/// * `timeout` - Optional HTTP request timeout
///
/// # Errors
/// Returns error if:
/// - Provider is unknown
/// - Required secrets are missing
/// - Client initialization fails
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Option<Duration>,
) -> Result<Arc<dyn LlmClient>, String> {
    let provider_type =
        ProviderType::parse(provider).ok_or_else(|| format!("Unknown provider: {}", provider))?;

    let base_url = endpoint.unwrap_or(provider_type.default_base_url());

    match provider_type {
        ProviderType::Ollama => {
            let client = OllamaClient::new(base_url, timeout).map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
        ProviderType::OpenAI | ProviderType::Groq => {
            let api_key = api_key.ok_or_else(|| {
                format!("{} provider requires API key", provider_type.as_str())
            })?;
            let client =
                OpenAiCompatibleClient::new(provider_type.as_str(), base_url, api_key, timeout)
                    .map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
    }
}
