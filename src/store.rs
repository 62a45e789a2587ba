//! Knowledge store: SQLite persistence plus an in-memory vector index.
//!
//! The store owns the chunk collection. Writes go through SQLite with a
//! dedup constraint so re-ingestion is idempotent; reads run against an
//! in-memory snapshot of all chunks. The snapshot is an `Arc` behind an
//! `RwLock` — a rebuild builds the replacement off to the side and swaps
//! it in one short critical section, so concurrent queries see either
//! the old index or the new one, never a mix.
//!
//! Scores returned by [`KnowledgeStore::query`] are raw cosine distances
//! (ascending = nearer); normalization onto `[0, 1]` is the retriever's
//! job, not the store's.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::sync::{Arc, RwLock};

use crate::models::{KbChunk, SourceType};

/// A chunk prepared for insertion (no id yet; SQLite assigns one).
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub source_type: SourceType,
    pub url: Option<String>,
    pub title: String,
    pub section_anchor: Option<String>,
    pub content: String,
    pub answer: Option<String>,
    pub embedding: Vec<f32>,
}

pub struct KnowledgeStore {
    pool: SqlitePool,
    index: RwLock<Arc<Vec<KbChunk>>>,
}

impl KnowledgeStore {
    /// Open a store over an already-migrated pool with an empty index.
    pub fn open(pool: SqlitePool) -> Self {
        Self {
            pool,
            index: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Number of chunks currently visible to queries.
    pub fn len(&self) -> usize {
        self.index.read().expect("index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restore the index from persisted rows.
    ///
    /// Returns `Some(count)` when at least one chunk was restored, `None`
    /// on absence or any read failure — the caller decides whether to
    /// fall back to a rebuild. A `None` never leaves a half-loaded index
    /// visible; the previous snapshot stays in place.
    pub async fn load(&self) -> Option<usize> {
        match self.fetch_all_chunks().await {
            Ok(chunks) if !chunks.is_empty() => {
                let count = chunks.len();
                self.swap_index(chunks);
                Some(count)
            }
            Ok(_) => None,
            Err(e) => {
                eprintln!("[KB LOAD] failed to restore index: {e:#}");
                None
            }
        }
    }

    /// Insert a chunk unless an identical one is already stored.
    ///
    /// Idempotent by content: a chunk whose
    /// `(source_type, url-or-empty, content_hash)` triple already exists
    /// is a no-op. Returns whether a new row was written.
    pub async fn upsert(&self, chunk: NewChunk) -> Result<bool> {
        let content_hash = content_hash(&chunk.content);
        let blob = vec_to_blob(&chunk.embedding);
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO kb_chunks
                (source_type, url, title, section_anchor, content, answer,
                 embedding, content_hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_type, COALESCE(url, ''), content_hash) DO NOTHING
            "#,
        )
        .bind(chunk.source_type.as_str())
        .bind(&chunk.url)
        .bind(&chunk.title)
        .bind(&chunk.section_anchor)
        .bind(&chunk.content)
        .bind(&chunk.answer)
        .bind(&blob)
        .bind(&content_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let stored = KbChunk {
            id: result.last_insert_rowid(),
            source_type: chunk.source_type,
            url: chunk.url,
            title: chunk.title,
            section_anchor: chunk.section_anchor,
            content: chunk.content,
            answer: chunk.answer,
            embedding: chunk.embedding,
            content_hash,
        };

        let mut guard = self.index.write().expect("index lock poisoned");
        Arc::make_mut(&mut guard).push(stored);
        Ok(true)
    }

    /// Return the `k` nearest chunks to `vector` with their raw cosine
    /// distances, ascending (nearer first). An empty index yields an
    /// empty result, not an error.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<(KbChunk, f64)> {
        let snapshot = {
            let guard = self.index.read().expect("index lock poisoned");
            Arc::clone(&guard)
        };

        // Score by index first; only the k survivors get cloned, so a
        // query never copies the whole index (embeddings included).
        let mut scored: Vec<(usize, f64)> = snapshot
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let distance = 1.0 - f64::from(cosine_similarity(vector, &chunk.embedding));
                (i, distance)
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, distance)| (snapshot[i].clone(), distance))
            .collect()
    }

    /// Replace the entire store contents and atomically swap the new
    /// index in. Returns the number of chunks stored.
    ///
    /// Queries running during the rebuild keep serving the previous
    /// snapshot until the swap.
    pub async fn rebuild(&self, chunks: Vec<NewChunk>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM kb_chunks").execute(&mut *tx).await?;

        let now = chrono::Utc::now().timestamp();
        for chunk in &chunks {
            sqlx::query(
                r#"
                INSERT INTO kb_chunks
                    (source_type, url, title, section_anchor, content, answer,
                     embedding, content_hash, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (source_type, COALESCE(url, ''), content_hash) DO NOTHING
                "#,
            )
            .bind(chunk.source_type.as_str())
            .bind(&chunk.url)
            .bind(&chunk.title)
            .bind(&chunk.section_anchor)
            .bind(&chunk.content)
            .bind(&chunk.answer)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(content_hash(&chunk.content))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        // Re-read committed rows so ids and dedup outcomes are authoritative.
        let stored = self.fetch_all_chunks().await?;
        let count = stored.len();
        self.swap_index(stored);
        Ok(count)
    }

    fn swap_index(&self, chunks: Vec<KbChunk>) {
        let mut guard = self.index.write().expect("index lock poisoned");
        *guard = Arc::new(chunks);
    }

    async fn fetch_all_chunks(&self) -> Result<Vec<KbChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_type, url, title, section_anchor, content,
                   answer, embedding, content_hash
            FROM kb_chunks
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let source_type: String = row.get("source_type");
            let Some(source_type) = SourceType::parse(&source_type) else {
                // Unknown provenance rows are skipped, not fatal.
                continue;
            };
            let blob: Vec<u8> = row.get("embedding");
            chunks.push(KbChunk {
                id: row.get("id"),
                source_type,
                url: row.get("url"),
                title: row.get("title"),
                section_anchor: row.get("section_anchor"),
                content: row.get("content"),
                answer: row.get("answer"),
                embedding: blob_to_vec(&blob),
                content_hash: row.get("content_hash"),
            });
        }
        Ok(chunks)
    }
}

/// Hex SHA-256 digest of chunk content, the dedup key component.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello "));
        assert_eq!(content_hash("hello").len(), 64);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
