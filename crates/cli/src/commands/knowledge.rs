//! Knowledge command handler.
//!
//! Manages the knowledge bases behind local retrieval. Every subcommand
//! works on the pipeline's base unless another one is named.

use clap::{Args, Subcommand};
use cityhub_core::{config::AppConfig, AppError, AppResult};
use cityhub_knowledge::{ChunkSpan, LearnOptions, QueryOptions};
use serde::Serialize;
use std::path::PathBuf;

/// Knowledge base management (local index)
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Learn from files, directories and URLs
    Learn(LearnCommand),
    /// Show the passages a question would retrieve
    Query(QueryCommand),
    /// Remove every learned source
    Clean(CleanCommand),
    /// Show knowledge base statistics
    Stats(StatsCommand),
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            KnowledgeAction::Learn(cmd) => cmd.execute(config).await,
            KnowledgeAction::Query(cmd) => cmd.execute(config).await,
            KnowledgeAction::Clean(cmd) => cmd.execute(config),
            KnowledgeAction::Stats(cmd) => cmd.execute(config),
        }
    }
}

#[derive(Args, Debug)]
pub struct LearnCommand {
    /// Knowledge base name
    pub base: Option<String>,

    /// File or directory to learn (repeatable)
    #[arg(long)]
    pub path: Vec<PathBuf>,

    /// Page to fetch and learn (repeatable)
    #[arg(long)]
    pub url: Vec<String>,

    /// Only learn files whose path contains one of these
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip files whose path contains one of these
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Empty the base first
    #[arg(long)]
    pub reset: bool,

    #[arg(long)]
    pub json: bool,
}

impl LearnCommand {
    async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if self.path.is_empty() && self.url.is_empty() {
            return Err(AppError::Config(
                "Nothing to learn: pass --path and/or --url".to_string(),
            ));
        }

        let base = resolve_base(&self.base, config);
        tracing::info!(base = %base, paths = self.path.len(), urls = self.url.len(), "Learning");

        let stats = cityhub_knowledge::learn(
            &config.workspace,
            LearnOptions {
                base_name: base,
                paths: self.path.clone(),
                urls: self.url.clone(),
                include: self.include.clone(),
                exclude: self.exclude.clone(),
                reset: self.reset,
            },
        )
        .await?;

        if self.json {
            return print_json(&stats);
        }
        println!(
            "Learned {} sources ({} chunks, {} bytes, {} skipped) in {:.2}s",
            stats.sources_count,
            stats.chunks_count,
            stats.bytes_processed,
            stats.skipped_count,
            stats.duration_secs
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Question or search text
    pub query: String,

    /// Knowledge base name
    #[arg(short, long)]
    pub base: Option<String>,

    /// Passages to show (default: pipeline topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<u32>,

    #[arg(long)]
    pub json: bool,
}

/// One `--json` line of `knowledge query`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Passage<'a> {
    score: f32,
    source_id: &'a str,
    position: u32,
    span: ChunkSpan,
    text: &'a str,
}

impl QueryCommand {
    async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = resolve_base(&self.base, config);
        let top_k = self
            .top_k
            .unwrap_or_else(|| u32::try_from(config.pipeline.top_k).unwrap_or(u32::MAX));

        let result = cityhub_knowledge::query(
            &config.workspace,
            QueryOptions {
                base_name: base,
                query: self.query.clone(),
                top_k,
            },
        )
        .await?;

        let passages: Vec<Passage<'_>> = result
            .chunks
            .iter()
            .zip(&result.scores)
            .map(|(chunk, &score)| Passage {
                score,
                source_id: &chunk.source_id,
                position: chunk.position,
                span: chunk.span,
                text: chunk.text.trim(),
            })
            .collect();

        if self.json {
            return print_json(&passages);
        }
        if passages.is_empty() {
            println!("No passages found");
        }
        for (i, passage) in passages.iter().enumerate() {
            println!("[{}] score {:.3}\n{}\n", i + 1, passage.score, passage.text);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Knowledge base name
    pub base: Option<String>,
}

impl CleanCommand {
    fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = resolve_base(&self.base, config);
        cityhub_knowledge::clean(&config.workspace, &base)?;
        println!("Knowledge base '{}' cleaned", base);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Knowledge base name
    pub base: Option<String>,

    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = resolve_base(&self.base, config);
        let stats = cityhub_knowledge::stats(&config.workspace, &base)?;

        if self.json {
            return print_json(&stats);
        }
        println!("Knowledge base: {}", stats.base_name);
        println!("  Sources: {}", stats.sources_count);
        println!("  Chunks: {}", stats.chunks_count);
        println!("  DB size: {} bytes", stats.db_size_bytes);
        if let Some(at) = stats.last_learn_at {
            println!("  Last learn: {}", at.to_rfc3339());
        }
        Ok(())
    }
}

fn resolve_base(base: &Option<String>, config: &AppConfig) -> String {
    base.clone()
        .unwrap_or_else(|| config.pipeline.knowledge_base.clone())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> AppResult<()> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
