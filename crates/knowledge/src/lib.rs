//! Local knowledge bases for CityHub.
//!
//! Provides the local evidence index: documents and web pages are chunked,
//! embedded and stored in SQLite, then retrieved by cosine similarity.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod parser;
pub mod types;

pub use embeddings::{create_provider, EmbeddingProvider};
pub use types::{
    BaseStats, ChunkSpan, KnowledgeBaseConfig, KnowledgeChunk, KnowledgeSource, LearnOptions,
    LearnStats, QueryOptions, QueryResult, SourceKind,
};

use chrono::Utc;
use cityhub_core::{AppError, AppResult};
use parser::ContentType;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

const FETCH_TIMEOUT_SECS: u64 = 30;

/// A parsed document waiting to be chunked.
struct Document {
    location: String,
    kind: SourceKind,
    content_type: ContentType,
    text: String,
}

/// A document after chunking and embedding, ready to store.
struct PreparedDocument {
    source: KnowledgeSource,
    chunks: Vec<KnowledgeChunk>,
}

/// Learn from files, directories and URLs into a knowledge base.
///
/// Sources that cannot be read or fetched are logged and skipped; a failure
/// of the index itself aborts the run.
pub async fn learn(workspace: &Path, options: LearnOptions) -> AppResult<LearnStats> {
    let start = Instant::now();

    tracing::info!(base = %options.base_name, "Learning into knowledge base");

    let config = config::load_config(workspace, &options.base_name)?;
    let provider = create_provider(&config)?;

    let index_path = config::get_index_path(workspace, &options.base_name);
    let mut conn = index::init_index(&index_path)?;

    if options.reset {
        tracing::info!(base = %options.base_name, "Emptying base before learning");
        index::reset_index(&conn)?;
    }

    let mut stats = LearnStats::default();

    for path in collect_files(&options) {
        match parser::parse_file(&path) {
            Ok(text) => {
                let document = Document {
                    location: path.to_string_lossy().to_string(),
                    kind: SourceKind::File,
                    content_type: ContentType::from_path(&path),
                    text,
                };
                let prepared = prepare(document, provider.as_ref(), &config).await?;
                store(&mut conn, &prepared, &mut stats)?;
            }
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                stats.skipped_count += 1;
            }
        }
    }

    if !options.urls.is_empty() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Knowledge(format!("Failed to build HTTP client: {}", e)))?;

        for url in &options.urls {
            match fetch_url(&client, url).await {
                Ok(document) => {
                    let prepared = prepare(document, provider.as_ref(), &config).await?;
                    store(&mut conn, &prepared, &mut stats)?;
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", url, e);
                    stats.skipped_count += 1;
                }
            }
        }
    }

    config::save_config(workspace, &config)?;

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        sources = stats.sources_count,
        chunks = stats.chunks_count,
        bytes = stats.bytes_processed,
        skipped = stats.skipped_count,
        "Learned in {:.2}s",
        stats.duration_secs
    );

    Ok(stats)
}

/// Expand the learn paths into the list of files to ingest.
fn collect_files(options: &LearnOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in &options.paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .follow_links(false)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .filter(|p| should_include(p, options)),
            );
        } else {
            tracing::warn!("Path does not exist: {:?}", path);
        }
    }

    files
}

/// Check a file against the include/exclude substring filters.
fn should_include(path: &Path, options: &LearnOptions) -> bool {
    let path_str = path.to_string_lossy();

    if options.exclude.iter().any(|p| path_str.contains(p.as_str())) {
        return false;
    }

    options.include.is_empty() || options.include.iter().any(|p| path_str.contains(p.as_str()))
}

async fn fetch_url(client: &reqwest::Client, url: &str) -> AppResult<Document> {
    tracing::debug!("Fetching {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(AppError::Knowledge(format!(
            "Fetching {} returned {}",
            url,
            response.status()
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ContentType::from_mime)
        .unwrap_or(ContentType::Unknown);

    let raw = response
        .text()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to read body of {}: {}", url, e)))?;

    Ok(Document {
        location: url.to_string(),
        kind: SourceKind::Url,
        content_type,
        text: parser::parse_content(content_type, &raw)?,
    })
}

async fn prepare(
    document: Document,
    provider: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
) -> AppResult<PreparedDocument> {
    let source_id = uuid::Uuid::new_v4().to_string();

    let candidates = chunker::chunk_text(
        &document.text,
        config.chunk_size as usize,
        config.chunk_overlap as usize,
    );
    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let embeddings = provider.embed_batch(&texts).await?;

    let chunks = candidates
        .into_iter()
        .zip(embeddings)
        .map(|(candidate, embedding)| KnowledgeChunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.clone(),
            position: candidate.position,
            text: candidate.text,
            embedding: Some(embedding),
            span: candidate.span,
        })
        .collect();

    Ok(PreparedDocument {
        source: KnowledgeSource {
            id: source_id,
            location: document.location,
            kind: document.kind,
            content_type: document.content_type.as_str().to_string(),
            learned_at: Utc::now(),
            size_bytes: document.text.len() as u64,
        },
        chunks,
    })
}

fn store(
    conn: &mut Connection,
    prepared: &PreparedDocument,
    stats: &mut LearnStats,
) -> AppResult<()> {
    index::store_document(conn, &prepared.source, &prepared.chunks)?;

    tracing::debug!(
        location = %prepared.source.location,
        chunks = prepared.chunks.len(),
        "Stored document"
    );

    stats.record(&prepared.source, prepared.chunks.len());
    Ok(())
}

/// Query the knowledge base for the chunks most similar to a query.
pub async fn query(workspace: &Path, options: QueryOptions) -> AppResult<QueryResult> {
    tracing::debug!(base = %options.base_name, query = %options.query, "Querying knowledge base");

    let config = config::load_config(workspace, &options.base_name)?;

    let index_path = config::get_index_path(workspace, &options.base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' has no index. Run 'cityhub knowledge learn' first.",
            options.base_name
        )));
    }

    let provider = create_provider(&config)?;
    let query_embedding = provider.embed(&options.query).await?;

    let conn = index::init_index(&index_path)?;
    let results = index::query_chunks(&conn, &query_embedding, options.top_k as usize)?;

    let (chunks, scores): (Vec<KnowledgeChunk>, Vec<f32>) = results.into_iter().unzip();

    if let (Some(top), Some(lowest)) = (scores.first(), scores.last()) {
        tracing::debug!(count = chunks.len(), top, lowest, "Retrieved chunks");
    }

    Ok(QueryResult { chunks, scores })
}

/// Drop every source of an existing base. Settings are kept.
pub fn clean(workspace: &Path, base_name: &str) -> AppResult<()> {
    let conn = open_existing(workspace, base_name)?;
    index::reset_index(&conn)?;
    tracing::info!(base = base_name, "Knowledge base cleaned");
    Ok(())
}

/// Counts and on-disk size of an existing base.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    let conn = open_existing(workspace, base_name)?;
    let (sources_count, chunks_count) = index::get_stats(&conn)?;
    let last_learn_at = index::last_learned_at(&conn)?;

    let index_path = config::get_index_path(workspace, base_name);
    let db_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    Ok(BaseStats {
        base_name: base_name.to_string(),
        sources_count,
        chunks_count,
        db_size_bytes,
        last_learn_at,
    })
}

fn open_existing(workspace: &Path, base_name: &str) -> AppResult<Connection> {
    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }
    index::init_index(&index_path)
}
