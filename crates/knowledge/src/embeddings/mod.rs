//! Embedding providers for knowledge bases.
//!
//! The provider is chosen per base in its `config.yaml`; the same provider
//! must be used to learn and to query a base.

pub mod ollama;
pub mod trigram;

pub use ollama::OllamaEmbeddings;
pub use trigram::TrigramEmbeddings;

use crate::types::KnowledgeBaseConfig;
use cityhub_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Provider name (e.g., "trigram", "ollama")
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}

/// Create the embedding provider a knowledge base is configured with.
pub fn create_provider(config: &KnowledgeBaseConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let dimensions = config.embedding_dim as usize;

    match config.provider.as_str() {
        "trigram" => Ok(Arc::new(TrigramEmbeddings::new(dimensions))),
        "ollama" => {
            let provider = OllamaEmbeddings::new(
                config.endpoint.as_deref(),
                config.model.clone(),
                dimensions,
            )?;
            Ok(Arc::new(provider))
        }
        other => Err(AppError::Knowledge(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            other
        ))),
    }
}
