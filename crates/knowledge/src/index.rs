//! SQLite store for sources, chunks and their embeddings.
//!
//! Embeddings are stored as little-endian `f32` blobs and ranked in memory by
//! cosine similarity; city-service corpora stay small enough for a full scan.

use crate::types::{ChunkSpan, KnowledgeChunk, KnowledgeSource};
use chrono::{DateTime, Utc};
use cityhub_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::cmp::Ordering;
use std::path::Path;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    location TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    content_type TEXT NOT NULL,
    learned_at TEXT NOT NULL,
    size_bytes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    span_start INTEGER NOT NULL,
    span_end INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id);
"#;

/// Attach `context` to a SQLite failure.
fn db(context: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::Knowledge(format!("{}: {}", context, e))
}

/// Open (creating if needed) the index at `db_path`.
pub fn init_index(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path).map_err(db("Cannot open index"))?;
    conn.execute_batch(SCHEMA).map_err(db("Cannot create schema"))?;

    tracing::debug!(path = %db_path.display(), "Opened knowledge index");
    Ok(conn)
}

/// Store one document and its chunks atomically. An earlier copy of the
/// same location is replaced, chunks included.
pub fn store_document(
    conn: &mut Connection,
    source: &KnowledgeSource,
    chunks: &[KnowledgeChunk],
) -> AppResult<()> {
    let tx = conn.transaction().map_err(db("Cannot start transaction"))?;

    tx.execute("DELETE FROM sources WHERE location = ?1", params![source.location])
        .map_err(db("Cannot replace source"))?;
    tx.execute(
        "INSERT INTO sources (id, location, kind, content_type, learned_at, size_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            source.id,
            source.location,
            source.kind.as_str(),
            source.content_type,
            source.learned_at.to_rfc3339(),
            source.size_bytes as i64,
        ],
    )
    .map_err(db("Cannot insert source"))?;

    {
        let mut insert = tx
            .prepare(
                "INSERT INTO chunks (id, source_id, position, text, embedding, span_start, span_end)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(db("Cannot prepare chunk insert"))?;

        for chunk in chunks {
            let embedding = chunk.embedding.as_deref().ok_or_else(|| {
                AppError::Knowledge(format!("Chunk {} has no embedding", chunk.id))
            })?;
            insert
                .execute(params![
                    chunk.id,
                    chunk.source_id,
                    chunk.position as i64,
                    chunk.text,
                    encode_embedding(embedding),
                    chunk.span.start as i64,
                    chunk.span.end as i64,
                ])
                .map_err(db("Cannot insert chunk"))?;
        }
    }

    tx.commit().map_err(db("Cannot commit document"))
}

/// The `top_k` chunks most similar to `query_embedding`, best first.
pub fn query_chunks(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
) -> AppResult<Vec<(KnowledgeChunk, f32)>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_id, position, text, embedding, span_start, span_end FROM chunks",
        )
        .map_err(db("Cannot prepare chunk scan"))?;

    let rows = stmt
        .query_map([], |row| {
            let blob: Vec<u8> = row.get(4)?;
            let chunk = KnowledgeChunk {
                id: row.get(0)?,
                source_id: row.get(1)?,
                position: row.get::<_, i64>(2)? as u32,
                text: row.get(3)?,
                embedding: None,
                span: ChunkSpan {
                    start: row.get::<_, i64>(5)? as usize,
                    end: row.get::<_, i64>(6)? as usize,
                },
            };
            Ok((chunk, blob))
        })
        .map_err(db("Cannot scan chunks"))?;

    let mut ranked = Vec::new();
    for row in rows {
        let (mut chunk, blob) = row.map_err(db("Cannot read chunk"))?;
        let embedding = decode_embedding(&blob)?;
        let score = cosine_similarity(query_embedding, &embedding);
        chunk.embedding = Some(embedding);
        ranked.push((chunk, score));
    }

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(top_k);
    Ok(ranked)
}

/// Number of sources and chunks.
pub fn get_stats(conn: &Connection) -> AppResult<(u32, u32)> {
    conn.query_row(
        "SELECT (SELECT COUNT(*) FROM sources), (SELECT COUNT(*) FROM chunks)",
        [],
        |row| Ok((row.get::<_, i64>(0)? as u32, row.get::<_, i64>(1)? as u32)),
    )
    .map_err(db("Cannot count index rows"))
}

pub fn last_learned_at(conn: &Connection) -> AppResult<Option<DateTime<Utc>>> {
    let latest = conn
        .query_row("SELECT MAX(learned_at) FROM sources", [], |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()
        .map_err(db("Cannot read learn time"))?
        .flatten();

    Ok(latest
        .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
        .map(|ts| ts.with_timezone(&Utc)))
}

/// Drop every source; chunks follow through the cascade.
pub fn reset_index(conn: &Connection) -> AppResult<()> {
    let removed = conn
        .execute("DELETE FROM sources", [])
        .map_err(db("Cannot reset index"))?;
    tracing::info!(removed, "Reset knowledge index");
    Ok(())
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> AppResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(AppError::Knowledge(format!(
            "Corrupt embedding blob of {} bytes",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Cosine similarity; mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}
