//! Knowledge base records and operation options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings stored in `<base>/config.yaml`.
///
/// Queries must embed with the same provider and model the base was learned
/// with, so these are persisted on every learn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeBaseConfig {
    /// Taken from the directory name on load
    pub name: String,
    /// `trigram` (offline) or `ollama`
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Characters per chunk
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub embedding_dim: u32,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        // 2000/400 characters is roughly 500 tokens with 100 of overlap.
        Self {
            name: String::new(),
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            endpoint: None,
            chunk_size: 2000,
            chunk_overlap: 400,
            embedding_dim: 384,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Url,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
        }
    }
}

/// A learned document. Its location is unique within a base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,
    /// File path or URL
    pub location: String,
    pub kind: SourceKind,
    /// `markdown`, `html`, `text`, ...
    pub content_type: String,
    pub learned_at: DateTime<Utc>,
    /// Size of the extracted text, not of the raw file
    pub size_bytes: u64,
}

/// Byte range of a chunk within its source's extracted text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub source_id: String,
    /// Order within the source, from 0
    pub position: u32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub span: ChunkSpan,
}

/// What to learn and into which base.
#[derive(Debug, Clone, Default)]
pub struct LearnOptions {
    pub base_name: String,
    /// Files, or directories walked recursively
    pub paths: Vec<PathBuf>,
    pub urls: Vec<String>,
    /// A walked file is kept only if its path contains one of these
    pub include: Vec<String>,
    /// A walked file is dropped if its path contains any of these
    pub exclude: Vec<String>,
    /// Empty the base first
    pub reset: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnStats {
    pub sources_count: u32,
    pub chunks_count: u32,
    pub bytes_processed: u64,
    /// Unreadable files and failed fetches
    pub skipped_count: u32,
    pub duration_secs: f64,
}

impl LearnStats {
    /// Count one stored document.
    pub fn record(&mut self, source: &KnowledgeSource, chunks: usize) {
        self.sources_count += 1;
        self.chunks_count += chunks as u32;
        self.bytes_processed += source.size_bytes;
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub base_name: String,
    pub query: String,
    pub top_k: u32,
}

/// Chunks most similar to the query, best first, with their cosine scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub chunks: Vec<KnowledgeChunk>,
    pub scores: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStats {
    pub base_name: String,
    pub sources_count: u32,
    pub chunks_count: u32,
    pub db_size_bytes: u64,
    pub last_learn_at: Option<DateTime<Utc>>,
}

/// A chunk before it has an id and an embedding.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub position: u32,
    pub text: String,
    pub span: ChunkSpan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: KnowledgeBaseConfig =
            serde_yaml::from_str("provider: ollama\nchunkSize: 512\n").unwrap();

        assert_eq!(config.provider, "ollama");
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 400);
        assert_eq!(config.model, "trigram-v1");
    }

    #[test]
    fn test_learn_stats_record() {
        let source = KnowledgeSource {
            id: "s".to_string(),
            location: "permits.md".to_string(),
            kind: SourceKind::File,
            content_type: "markdown".to_string(),
            learned_at: Utc::now(),
            size_bytes: 120,
        };
        let mut stats = LearnStats::default();
        stats.record(&source, 2);
        stats.record(&source, 1);

        assert_eq!(stats.sources_count, 2);
        assert_eq!(stats.chunks_count, 3);
        assert_eq!(stats.bytes_processed, 240);
    }
}
